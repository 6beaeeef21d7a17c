//! Parsing command-line field values according to the field's kind.

use anyhow::{Result, anyhow, bail};
use vantage_core::field::{FieldData, FieldKind, MoneyValue};

/// Parse `raw` as a value of `kind`.
///
/// | Kind | Accepted input |
/// |------|----------------|
/// | text, category | any non-empty string |
/// | number | `1200`, `1.5e6` |
/// | money | `12.5 USD` or `USD 12.5` |
/// | list | comma-separated items |
/// | flag | `true`/`false`, `yes`/`no` |
pub fn parse(kind: FieldKind, raw: &str) -> Result<FieldData> {
  let raw = raw.trim();
  if raw.is_empty() {
    bail!("value must not be empty");
  }
  let data = match kind {
    FieldKind::Text => FieldData::Text(raw.to_owned()),
    FieldKind::Category => FieldData::Category(raw.to_owned()),
    FieldKind::Number => FieldData::Number(number(raw)?),
    FieldKind::Money => FieldData::Money(money(raw)?),
    FieldKind::List => FieldData::List(
      raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect(),
    ),
    FieldKind::Flag => FieldData::Flag(match raw.to_ascii_lowercase().as_str() {
      "true" | "yes" | "y" | "1" => true,
      "false" | "no" | "n" | "0" => false,
      other => bail!("{other:?} is not a flag; use true or false"),
    }),
  };
  Ok(data)
}

fn number(raw: &str) -> Result<f64> {
  let n: f64 = raw
    .replace('_', "")
    .parse()
    .map_err(|_| anyhow!("{raw:?} is not a number"))?;
  if !n.is_finite() {
    bail!("{raw:?} is not a finite number");
  }
  Ok(n)
}

fn money(raw: &str) -> Result<MoneyValue> {
  let parts: Vec<&str> = raw.split_whitespace().collect();
  let [a, b] = parts.as_slice() else {
    bail!("money must be written as \"<amount> <currency>\", e.g. \"12.5 USD\"");
  };
  let (amount, currency) = match number(a) {
    Ok(amount) => (amount, *b),
    Err(_) => (number(b)?, *a),
  };
  Ok(MoneyValue { amount, currency: currency.to_ascii_uppercase() })
}
