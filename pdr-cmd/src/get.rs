use std::io::{stdout, Write};

use anyhow::{Context, Result};
use pdr::{ObjectValue, Product};

pub fn get(product: &Product, object: &str) -> Result<()> {
    let value = product
        .get(object)
        .with_context(|| format!("loading {object}"))?;
    let mut out = stdout().lock();
    match value {
        ObjectValue::Table(table) => table.write_csv(&mut out).context("writing csv")?,
        ObjectValue::Label(text) | ObjectValue::Header(text) | ObjectValue::Text(text) => {
            out.write_all(text.as_bytes()).context("writing to stdout")?;
        }
        ObjectValue::Array(image) => {
            let (bands, lines, samples) = image.shape();
            writeln!(out, "shape: {bands} x {lines} x {samples}")?;
            writeln!(out, "type:  {:?}", image.sample_type)?;
            match image.stats() {
                Some(s) => writeln!(
                    out,
                    "min: {}  max: {}  mean: {}  count: {}",
                    s.min, s.max, s.mean, s.count
                )?,
                None => writeln!(out, "every value is masked")?,
            }
        }
    }
    Ok(())
}
