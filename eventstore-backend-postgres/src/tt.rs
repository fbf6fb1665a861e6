//! TT (tag side-table) index encoding. Each event's tags are expanded into
//! rows of a `(tag, type, main_id)` side table; queries join against it and
//! count matched distinct tags per candidate row. Grounded in
//! `examples/dcb/postgres_tt.py`.

use eventstore_core::query::{Query, QueryItem};

/// The query shapes TT can translate to a single indexed join, mirroring
/// `postgres_tt.py::_read`'s dispatch (`one_query_item_one_type`,
/// `all_query_items_have_tags`). Anything else is a [`Shape::Unsupported`]
/// and the caller should reject it with `StoreError::NotSupported` rather
/// than silently mis-evaluate it.
pub enum Shape<'a> {
    MatchAll,
    SingleType(&'a str),
    Tagged(&'a [QueryItem]),
    Unsupported,
}

pub fn classify(query: &Query) -> Shape<'_> {
    if query.items.is_empty() {
        return Shape::MatchAll;
    }
    if query.items.iter().any(is_unconstrained) {
        return Shape::MatchAll;
    }
    if query.items.len() == 1 && query.items[0].types.len() == 1 && query.items[0].tags.is_empty()
    {
        return Shape::SingleType(&query.items[0].types[0]);
    }
    if query.items.iter().all(|item| !item.tags.is_empty()) {
        return Shape::Tagged(&query.items);
    }
    Shape::Unsupported
}

fn is_unconstrained(item: &QueryItem) -> bool {
    item.types.is_empty() && item.tags.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_query_is_match_all() {
        assert!(matches!(classify(&Query::match_all()), Shape::MatchAll));
    }

    #[test]
    fn single_type_no_tags_is_fast_pathed() {
        let q = Query::new([QueryItem::new(["Foo"], Vec::<String>::new())]);
        assert!(matches!(classify(&q), Shape::SingleType("Foo")));
    }

    #[test]
    fn multiple_types_no_tags_is_unsupported() {
        let q = Query::new([QueryItem::new(["Foo", "Bar"], Vec::<String>::new())]);
        assert!(matches!(classify(&q), Shape::Unsupported));
    }

    #[test]
    fn all_items_with_tags_is_tagged() {
        let q = Query::new([
            QueryItem::with_tags(["a"]),
            QueryItem::new(["Foo"], ["b"]),
        ]);
        assert!(matches!(classify(&q), Shape::Tagged(_)));
    }

    #[test]
    fn mixed_tagged_and_type_only_is_unsupported() {
        let q = Query::new([
            QueryItem::with_tags(["a"]),
            QueryItem::new(["Foo"], Vec::<String>::new()),
        ]);
        assert!(matches!(classify(&q), Shape::Unsupported));
    }
}
