pub mod completions;
pub mod config;
pub mod replay;

use anyhow::{Result, bail};
use std::collections::BTreeMap;

/// Parse repeated `KEY=VALUE` flags into a parameter map.
///
/// # Errors
///
/// Returns an error for an entry without `=` or with an empty key.
pub fn parse_params(raw: &[String]) -> Result<BTreeMap<String, String>> {
    let mut params = BTreeMap::new();
    for entry in raw {
        let Some((key, value)) = entry.split_once('=') else {
            bail!("Invalid parameter '{entry}': expected KEY=VALUE");
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("Invalid parameter '{entry}': empty key");
        }
        params.insert(key.to_string(), value.trim().to_string());
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_split_on_first_equals() {
        let params = parse_params(&["modif_rate_min_level=0.8".into(), " a = b=c ".into()])
            .expect("parse");
        assert_eq!(params["modif_rate_min_level"], "0.8");
        assert_eq!(params["a"], "b=c");
    }

    #[test]
    fn params_reject_malformed_entries() {
        assert!(parse_params(&["novalue".into()]).is_err());
        assert!(parse_params(&["=3".into()]).is_err());
    }
}
