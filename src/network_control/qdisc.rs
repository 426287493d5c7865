//! `tc netem` parsing, input validation and command construction.
//!
//! The parser only understands whole-number delays (`10ms`, `500us`) and
//! whole percentages; anything else is reported as the default value.

use log::info;
use regex::Regex;

use super::command::privileged;
use super::types::{NetemRequest, NetemSettings, DEFAULT_JITTER, DEFAULT_LATENCY, DEFAULT_LOSS};
use crate::error_handling::types::ControlError;

const MAX_DELAY_DIGITS: usize = 6;

/// Compiled patterns for `tc qdisc show` output.
#[derive(Debug, Clone)]
pub struct QdiscParser {
    latency: Regex,
    jitter: Regex,
    loss: Regex,
}

impl QdiscParser {
    pub fn new() -> Result<Self, ControlError> {
        let compile =
            |pattern: &str| Regex::new(pattern).map_err(|e| ControlError::ParseError(e.to_string()));
        Ok(Self {
            latency: compile(r"delay (\d+(?:ms|us))")?,
            jitter: compile(r"delay \d+(?:ms|us)\s+(\d+(?:ms|us))")?,
            loss: compile(r"loss (\d+)%")?,
        })
    }

    /// Extracts latency, jitter and loss, using defaults for anything missing.
    pub fn parse(&self, output: &str) -> NetemSettings {
        let capture =
            |re: &Regex| re.captures(output).and_then(|c| c.get(1)).map(|m| m.as_str());

        NetemSettings {
            latency: capture(&self.latency)
                .unwrap_or(DEFAULT_LATENCY)
                .to_string(),
            loss: capture(&self.loss)
                .map(|n| format!("{}%", n))
                .unwrap_or_else(|| DEFAULT_LOSS.to_string()),
            jitter: capture(&self.jitter).unwrap_or(DEFAULT_JITTER).to_string(),
        }
    }
}

pub fn has_netem(output: &str) -> bool {
    output.contains("netem")
}

/// Validates a latency or jitter field. Empty means unchanged.
pub fn validate_delay(value: Option<&str>, field: &str) -> Result<Option<String>, String> {
    let value = match value.map(str::trim) {
        None | Some("") => return Ok(None),
        Some(v) => v,
    };
    let digits = value
        .len()
        .checked_sub(2)
        .filter(|&cut| {
            value
                .get(cut..)
                .is_some_and(|unit| unit.eq_ignore_ascii_case("ms"))
        })
        .and_then(|cut| value.get(..cut))
        .unwrap_or(value);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!("{} must be a whole number", field));
    }
    if digits.len() > MAX_DELAY_DIGITS {
        return Err(format!("{} cannot exceed 6 digits", field));
    }
    Ok(Some(digits.to_string()))
}

/// Validates a loss percentage. Empty means unchanged.
pub fn validate_loss(value: Option<&str>) -> Result<Option<String>, String> {
    let value = match value.map(str::trim) {
        None | Some("") => return Ok(None),
        Some(v) => v,
    };
    let digits = value.strip_suffix('%').unwrap_or(value);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err("Loss must be a whole number".to_string());
    }
    match digits.parse::<u64>() {
        Ok(n) if n <= 100 => Ok(Some(digits.to_string())),
        _ => Err("Loss must be between 0 and 100".to_string()),
    }
}

/// Validates all three form fields, collecting every error.
pub fn validate_request(
    latency: Option<&str>,
    loss: Option<&str>,
    jitter: Option<&str>,
) -> Result<NetemRequest, ControlError> {
    let mut errors = Vec::new();
    let mut request = NetemRequest::default();

    match validate_delay(latency, "Latency") {
        Ok(v) => request.latency = v,
        Err(e) => errors.push(e),
    }
    match validate_delay(jitter, "Jitter") {
        Ok(v) => request.jitter = v,
        Err(e) => errors.push(e),
    }
    match validate_loss(loss) {
        Ok(v) => request.loss = v,
        Err(e) => errors.push(e),
    }

    if errors.is_empty() {
        Ok(request)
    } else {
        Err(ControlError::Validation(errors))
    }
}

fn with_time_unit(value: String) -> String {
    if value.ends_with("ms") || value.ends_with("us") {
        value
    } else {
        format!("{}ms", value)
    }
}

/// Combines a request with the current settings into the effective values.
pub fn merge(current: &NetemSettings, request: &NetemRequest) -> NetemSettings {
    let mut latency = with_time_unit(
        request
            .latency
            .clone()
            .unwrap_or_else(|| current.latency.clone()),
    );
    let jitter = with_time_unit(
        request
            .jitter
            .clone()
            .unwrap_or_else(|| current.jitter.clone()),
    );
    let loss = request
        .loss
        .as_ref()
        .map(|l| format!("{}%", l))
        .unwrap_or_else(|| current.loss.clone());

    // netem needs a base delay for jitter
    if jitter != DEFAULT_JITTER && latency == DEFAULT_LATENCY {
        info!("Setting minimal latency of 1ms to accommodate jitter setting");
        latency = "1ms".to_string();
    }

    NetemSettings {
        latency,
        loss,
        jitter,
    }
}

pub fn show_command(use_sudo: bool, interface: &str) -> Vec<String> {
    privileged(use_sudo, &["tc", "qdisc", "show", "dev", interface])
}

pub fn delete_command(use_sudo: bool, interface: &str) -> Vec<String> {
    privileged(use_sudo, &["tc", "qdisc", "del", "dev", interface, "root", "netem"])
}

/// `tc qdisc replace dev <if> root netem [delay <lat> [<jit>]] [loss <n>]`.
pub fn replace_command(use_sudo: bool, interface: &str, settings: &NetemSettings) -> Vec<String> {
    let mut argv = privileged(
        use_sudo,
        &["tc", "qdisc", "replace", "dev", interface, "root", "netem"],
    );
    if settings.latency != DEFAULT_LATENCY {
        argv.push("delay".to_string());
        argv.push(settings.latency.clone());
        if settings.jitter != DEFAULT_JITTER {
            argv.push(settings.jitter.clone());
        }
    }
    if settings.loss != DEFAULT_LOSS {
        argv.push("loss".to_string());
        argv.push(settings.loss.trim_end_matches('%').to_string());
    }
    argv
}

#[cfg(test)]
mod tests {
    use super::*;

    const NETEM_FULL: &str =
        "qdisc netem 8001: root refcnt 2 limit 1000 delay 100ms  20ms loss 5%\n";
    const NETEM_DELAY_ONLY: &str = "qdisc netem 8002: root refcnt 2 limit 1000 delay 250us\n";
    const NETEM_LOSS_ONLY: &str = "qdisc netem 8003: root refcnt 2 limit 1000 loss 12%\n";
    const FQ_CODEL: &str =
        "qdisc fq_codel 0: root refcnt 2 limit 10240p flows 1024 quantum 1514 target 5ms\n";
    const FRACTIONAL: &str = "qdisc netem 8004: root refcnt 2 limit 1000 delay 10.5ms loss 0.5%\n";

    fn parse_qdisc(output: &str) -> NetemSettings {
        QdiscParser::new().unwrap().parse(output)
    }

    fn settings(latency: &str, loss: &str, jitter: &str) -> NetemSettings {
        NetemSettings {
            latency: latency.to_string(),
            loss: loss.to_string(),
            jitter: jitter.to_string(),
        }
    }

    #[test]
    fn parses_delay_jitter_and_loss() {
        assert_eq!(parse_qdisc(NETEM_FULL), settings("100ms", "5%", "20ms"));
    }

    #[test]
    fn parses_partial_netem_output() {
        assert_eq!(parse_qdisc(NETEM_DELAY_ONLY), settings("250us", "0%", "0ms"));
        assert_eq!(parse_qdisc(NETEM_LOSS_ONLY), settings("0ms", "12%", "0ms"));
    }

    #[test]
    fn non_netem_and_fractional_output_fall_back_to_defaults() {
        assert_eq!(parse_qdisc(FQ_CODEL), NetemSettings::default());
        assert_eq!(parse_qdisc(""), NetemSettings::default());
        assert_eq!(parse_qdisc(FRACTIONAL), NetemSettings::default());
        assert!(has_netem(NETEM_LOSS_ONLY));
        assert!(!has_netem(FQ_CODEL));
    }

    #[test]
    fn delay_validation() {
        assert_eq!(validate_delay(None, "Latency"), Ok(None));
        assert_eq!(validate_delay(Some("  "), "Latency"), Ok(None));
        assert_eq!(validate_delay(Some("100"), "Latency"), Ok(Some("100".into())));
        assert_eq!(validate_delay(Some("100MS"), "Latency"), Ok(Some("100".into())));
        assert_eq!(validate_delay(Some("100ms"), "Jitter"), Ok(Some("100".into())));
        assert_eq!(
            validate_delay(Some("1.5"), "Latency"),
            Err("Latency must be a whole number".into())
        );
        assert_eq!(
            validate_delay(Some("-5"), "Jitter"),
            Err("Jitter must be a whole number".into())
        );
        assert_eq!(
            validate_delay(Some("1234567"), "Latency"),
            Err("Latency cannot exceed 6 digits".into())
        );
    }

    #[test]
    fn loss_validation() {
        assert_eq!(validate_loss(Some("")), Ok(None));
        assert_eq!(validate_loss(Some("5%")), Ok(Some("5".into())));
        assert_eq!(validate_loss(Some("100")), Ok(Some("100".into())));
        assert_eq!(
            validate_loss(Some("101")),
            Err("Loss must be between 0 and 100".into())
        );
        assert_eq!(
            validate_loss(Some("abc")),
            Err("Loss must be a whole number".into())
        );
    }

    #[test]
    fn request_validation_reports_every_error() {
        let err = validate_request(Some("x"), Some("200"), Some("1234567")).unwrap_err();
        match err {
            ControlError::Validation(errors) => assert_eq!(
                errors,
                vec![
                    "Latency must be a whole number",
                    "Jitter cannot exceed 6 digits",
                    "Loss must be between 0 and 100",
                ]
            ),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn merge_keeps_current_values_and_adds_units() {
        let current = settings("50ms", "3%", "0ms");
        let request = NetemRequest {
            latency: Some("100".into()),
            ..Default::default()
        };
        assert_eq!(merge(&current, &request), settings("100ms", "3%", "0ms"));
    }

    #[test]
    fn jitter_without_latency_forces_minimal_delay() {
        let request = NetemRequest {
            jitter: Some("10".into()),
            ..Default::default()
        };
        let merged = merge(&NetemSettings::default(), &request);
        assert_eq!(merged, settings("1ms", "0%", "10ms"));
        assert_eq!(
            replace_command(true, "eth0", &merged).join(" "),
            "sudo tc qdisc replace dev eth0 root netem delay 1ms 10ms"
        );
    }

    #[test]
    fn replace_command_variants() {
        assert_eq!(
            replace_command(true, "eth0", &settings("100ms", "5%", "20ms")).join(" "),
            "sudo tc qdisc replace dev eth0 root netem delay 100ms 20ms loss 5"
        );
        assert_eq!(
            replace_command(false, "eth1", &settings("0ms", "7%", "0ms")).join(" "),
            "tc qdisc replace dev eth1 root netem loss 7"
        );
        assert_eq!(
            replace_command(false, "eth1", &NetemSettings::default()).join(" "),
            "tc qdisc replace dev eth1 root netem"
        );
    }

    #[test]
    fn show_and_delete_commands() {
        assert_eq!(show_command(true, "eth0").join(" "), "sudo tc qdisc show dev eth0");
        assert_eq!(
            delete_command(false, "eth0").join(" "),
            "tc qdisc del dev eth0 root netem"
        );
    }
}
