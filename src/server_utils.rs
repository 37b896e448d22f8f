pub fn sanitize_name(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "Player".to_string();
    }
    trimmed.chars().take(16).collect()
}

pub fn normalize_time_limit_ms(value: Option<i64>) -> Option<u64> {
    value.map(|minutes| minutes.clamp(1, 30) as u64 * 60_000)
}

pub fn normalize_seed(value: Option<i64>, fallback: u64) -> u32 {
    match value {
        Some(seed) => seed as u32,
        None => fallback as u32,
    }
}

pub fn player_order_key(player_id: &str) -> u64 {
    player_id
        .rsplit('_')
        .next()
        .and_then(|suffix| suffix.parse::<u64>().ok())
        .unwrap_or(u64::MAX)
}
