/// Interprets the common true/false spellings ("1", "true", "yes", "on" and their negations),
/// falling back to `default` when the value is missing or unrecognised.
pub fn parse_boolean_flag(value: Option<String>, default: bool) -> bool {
    value
        .as_deref()
        .map(|v| match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        })
        .unwrap_or(default)
}
