use crate::cli::args::CliArgs;
use crate::controller::RecoveryPolicy;
use crate::output::OutputFormat;

/// Flag combinations that can never work together. Values are checked after
/// they are merged with the config file.
pub fn validate(args: &CliArgs) -> Result<(), String> {
    if args.submit && args.interactive {
        return Err(
            "--submit cannot be combined with --interactive, use the 'submit' command".to_string(),
        );
    }
    Ok(())
}

pub fn output_format(raw: &str) -> Result<OutputFormat, String> {
    OutputFormat::parse(raw)
        .ok_or_else(|| format!("invalid output format '{raw}', expected text, json or html"))
}

pub fn recovery(raw: &str) -> Result<RecoveryPolicy, String> {
    RecoveryPolicy::parse(raw)
        .ok_or_else(|| format!("invalid recovery '{raw}', expected keep or notice"))
}

pub fn timeout(seconds: u64) -> Result<u64, String> {
    if seconds == 0 {
        return Err("invalid timeout, expected positive integer".to_string());
    }
    Ok(seconds)
}

pub fn header(raw: &str) -> Result<(), String> {
    if !raw.contains(':') {
        return Err(format!("invalid header '{raw}', expected 'Key: Value'"));
    }
    Ok(())
}
