use anyhow::{Context, Result};
use pdr::{DecodeWarning, Product};
use serde::Serialize;
use std::io::{stdout, Write};

#[derive(Debug, Clone)]
pub enum Format {
    Json,
    Text,
}

impl clap::ValueEnum for Format {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Json, Self::Text]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        match self {
            Self::Json => Some(clap::builder::PossibleValue::new("json")),
            Self::Text => Some(clap::builder::PossibleValue::new("text")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct Identifier {
    name: String,
    value: String,
}

#[derive(Debug, Clone, Serialize)]
struct Info {
    filename: String,
    label: String,
    format: String,
    keys: Vec<String>,
    identifiers: Vec<Identifier>,
    warnings: Vec<DecodeWarning>,
}

fn summarize(product: &Product) -> Info {
    Info {
        filename: product.path().to_string_lossy().to_string(),
        label: product.label_path().to_string_lossy().to_string(),
        format: format!("{:?}", product.label().format()),
        keys: product.keys().into_iter().map(str::to_string).collect(),
        identifiers: product
            .identifiers()
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| Identifier {
                name: k.to_string(),
                value: v.to_string(),
            })
            .collect(),
        warnings: product.warnings(),
    }
}

pub fn info(product: &Product, format: &Format) -> Result<()> {
    let info = summarize(product);

    match format {
        Format::Json => {
            serde_json::to_writer_pretty(stdout(), &info).context("serializing to json")
        }
        Format::Text => {
            let data = render_text(&info).context("serializing info")?;
            stdout()
                .write_all(str::as_bytes(&data))
                .context("writing to stdout")
        }
    }
}

fn render_text(info: &Info) -> Result<String> {
    let mut hb = handlebars::Handlebars::new();
    hb.register_escape_fn(handlebars::no_escape);
    hb.register_template_string("info", TEXT_TEMPLATE)
        .context("registering template")?;

    hb.render("info", &info).context("rendering text")
}

const TEXT_TEMPLATE: &str = r"{{ filename }}
===============================================================================
Label:    {{ label }} ({{ format }})
Objects:  {{ #each keys }}{{ this }}{{ #if @last }}{{ else }}, {{ /if }}{{ /each }}
-------------------------------------------------------------------------------
{{ #each identifiers }}{{ name }} = {{ value }}
{{ /each }}{{ #if warnings }}-------------------------------------------------------------------------------
Warnings:
{{ #each warnings }}  {{ object }}: {{ message }}
{{ /each }}{{ /if }}";
