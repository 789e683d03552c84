pub mod logger;

/// Lowercases `input` and joins its alphanumeric runs (any script) with single underscores
pub fn to_snake_case(input: &str) -> String {
    let mut s = input.to_lowercase();
    s = s.replace(|c: char| !c.is_alphanumeric(), "_");
    while s.contains("__") {
        s = s.replace("__", "_");
    }
    s.trim_matches('_').to_string()
}
