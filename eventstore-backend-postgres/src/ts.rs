//! TS (tsvector/GIN) index encoding. Event type and tags are joined into a
//! lexeme string prefixed `TYPE-`/`TAG-` and stored in a `tsvector` column;
//! queries compile to a `tsquery` expression combining `&`/`|` across tags
//! and types. Grounded in `examples/dcb/postgres_ts.py`.

use eventstore_core::{query::QueryItem, StoreError};

const RESERVED_CHARS: [char; 5] = [':', '&', '|', '(', ')'];
const RESERVED_PREFIXES: [&str; 2] = ["TYPE-", "TAG-"];

fn sanitize(token: &str) -> String {
    token.replace(':', "-")
}

fn check_reserved(tokens: &[String]) -> Result<(), StoreError> {
    for prefix in RESERVED_PREFIXES {
        if tokens.iter().any(|t| t.starts_with(prefix)) {
            return Err(StoreError::programming(format!(
                "type/tag uses reserved prefix '{prefix}'"
            )));
        }
    }
    for ch in RESERVED_CHARS {
        if tokens.iter().any(|t| t.contains(ch)) {
            return Err(StoreError::programming(format!(
                "type/tag contains reserved character '{ch}'"
            )));
        }
    }
    Ok(())
}

/// Build the lexeme string stored in `text_vector` for one event.
pub fn build_text_vector(event_type: &str, tags: &[String]) -> Result<String, StoreError> {
    let event_type = sanitize(event_type);
    let tags: Vec<String> = tags.iter().map(|t| sanitize(t)).collect();

    let mut all = vec![event_type.clone()];
    all.extend(tags.iter().cloned());
    check_reserved(&all)?;

    let mut parts = vec![format!("TYPE-{event_type}")];
    parts.extend(tags.iter().map(|t| format!("TAG-{t}")));
    Ok(parts.join(" "))
}

/// Build the `tsquery` expression for one [`QueryItem`]. An item with no
/// types and no tags matches everything and has no text-query
/// representation; callers must special-case it.
fn build_item_query(item: &QueryItem) -> String {
    let types: Vec<String> = item.types.iter().map(|t| sanitize(t)).collect();
    let tags: Vec<String> = item.tags.iter().map(|t| sanitize(t)).collect();

    let types_q = types
        .iter()
        .map(|t| format!("TYPE-{t}"))
        .collect::<Vec<_>>()
        .join(" | ");
    let tags_q = tags
        .iter()
        .map(|t| format!("TAG-{t}"))
        .collect::<Vec<_>>()
        .join(" & ");

    match (types_q.is_empty(), tags_q.is_empty()) {
        (false, false) => format!("({types_q}) & {tags_q}"),
        (false, true) => types_q,
        (true, false) => tags_q,
        (true, true) => String::new(),
    }
}

/// Combine a [`Query`][eventstore_core::query::Query]'s items into a single
/// `tsquery` expression. Returns `None` when the query matches everything
/// (an empty item list, or any item with neither types nor tags) — the
/// caller should skip the `text_vector @@ ...` predicate entirely in that
/// case rather than ask Postgres to parse an empty tsquery.
pub fn build_query_text(items: &[QueryItem]) -> Option<String> {
    if items.is_empty() {
        return None;
    }
    let mut parts = Vec::with_capacity(items.len());
    for item in items {
        let part = build_item_query(item);
        if part.is_empty() {
            // This item matches everything; the OR of the whole query does too.
            return None;
        }
        parts.push(format!("({part})"));
    }
    Some(parts.join(" | "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_prefix_is_rejected() {
        let err = build_text_vector("TYPE-whoops", &[]).unwrap_err();
        assert!(matches!(err, StoreError::Programming(_)));
    }

    #[test]
    fn reserved_char_is_rejected() {
        let err = build_text_vector("ok", &["a|b".to_string()]).unwrap_err();
        assert!(matches!(err, StoreError::Programming(_)));
    }

    #[test]
    fn colon_is_silently_replaced() {
        let vector = build_text_vector("ns:Type", &[]).unwrap();
        assert_eq!(vector, "TYPE-ns-Type");
    }

    #[test]
    fn empty_item_has_no_text_representation() {
        assert_eq!(build_item_query(&QueryItem::default()), "");
    }

    #[test]
    fn query_with_an_unconstrained_item_matches_everything() {
        let items = vec![QueryItem::with_tags(["a"]), QueryItem::default()];
        assert_eq!(build_query_text(&items), None);
    }

    #[test]
    fn types_and_tags_combine_with_and() {
        let item = QueryItem::new(["t1", "t2"], ["tagA"]);
        assert_eq!(build_item_query(&item), "(TYPE-t1 | TYPE-t2) & TAG-tagA");
    }
}
