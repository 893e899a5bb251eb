use tracing::warn;

pub const MAX_SYMBOL_LEN: usize = 10;

/// Uppercase and trim each symbol, keeping 1-10 ASCII letters. Invalid entries
/// are logged and dropped, as are repeats.
pub fn validate_symbols<S: AsRef<str>>(symbols: &[S]) -> Vec<String> {
    let mut valid: Vec<String> = Vec::with_capacity(symbols.len());
    for raw in symbols {
        let symbol = raw.as_ref().trim().to_uppercase();
        let well_formed = !symbol.is_empty()
            && symbol.len() <= MAX_SYMBOL_LEN
            && symbol.chars().all(|c| c.is_ascii_alphabetic());
        if !well_formed {
            warn!("Invalid symbol format: {:?}", raw.as_ref());
            continue;
        }
        if !valid.contains(&symbol) {
            valid.push(symbol);
        }
    }
    valid
}
