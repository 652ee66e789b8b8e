/// Render a scalar result for the user. No result reads as `"0"`.
pub fn format_scalar(value: Option<&str>) -> String {
    match value {
        Some(text) => text.to_string(),
        None => "0".to_string(),
    }
}
