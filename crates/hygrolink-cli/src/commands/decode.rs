//! Decode command implementation.
//!
//! Runs the payload codec offline, which is handy for checking what a sensor
//! sends without a Bluetooth adapter.

use anyhow::{Context, Result};
use hygrolink_types::codec;

use crate::cli::OutputFormat;
use crate::format::{FormatOptions, format_reading_json, format_reading_text};

pub fn cmd_decode(payload: &str, format: OutputFormat, opts: &FormatOptions) -> Result<()> {
    println!("{}", render(payload, format, opts)?);
    Ok(())
}

fn render(payload: &str, format: OutputFormat, opts: &FormatOptions) -> Result<String> {
    let reading =
        codec::decode(payload).with_context(|| format!("Cannot decode payload {:?}", payload))?;
    match format {
        OutputFormat::Text => Ok(format_reading_text(&reading, opts)),
        OutputFormat::Json => format_reading_json(&reading, None, None, opts),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAIN: FormatOptions = FormatOptions {
        fahrenheit: false,
        no_color: true,
    };

    #[test]
    fn test_render_text() {
        assert_eq!(
            render("18.0;40", OutputFormat::Text, &PLAIN).unwrap(),
            "18.0 °C  40 %"
        );
    }

    #[test]
    fn test_render_json() {
        let json = render("-3.5;90", OutputFormat::Json, &PLAIN).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["temperature"], -3.5);
        assert_eq!(value["humidity"], 90);
    }

    #[test]
    fn test_render_rejects_bad_payloads() {
        for payload in ["", "18.0", "18.0;40;1", "warm;40", "18.0;4.5"] {
            let err = render(payload, OutputFormat::Text, &PLAIN).unwrap_err();
            assert!(err.to_string().contains("Cannot decode payload"));
        }
    }
}
