// Stable string keys used to route async load results back to their owner.

pub fn entity_key(screen_id: &str) -> String {
    format!("entity:{screen_id}")
}

pub fn submit_key(screen_id: &str) -> String {
    format!("submit:{screen_id}")
}

// Reference option pages embed the request version so stale completions can
// be matched against the selector that issued them.
pub fn ref_key(field: &str, version: u64) -> String {
    format!("ref:{field}#{version}")
}

pub fn parse_ref_key(key: &str) -> Option<(&str, u64)> {
    let rest = key.strip_prefix("ref:")?;
    let (field, ver) = rest.rsplit_once('#')?;
    Some((field, ver.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_key_round_trips() {
        let k = ref_key("brand_id", 7);
        assert_eq!(parse_ref_key(&k), Some(("brand_id", 7)));
        assert!(parse_ref_key("entity:x").is_none());
        assert!(parse_ref_key("ref:no-version").is_none());
    }
}
