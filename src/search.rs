//! Token-AND substring search over caller-chosen projections.
//!
//! The caller supplies the projection (whatever text should be searchable
//! for an item) and a token separator. A match requires every query token to
//! be a case-insensitive substring of the projection. Two strategies exist,
//! a per-call scan and a prepared index, with identical results and stable
//! input order; only their work distribution differs.

/// Split a query into tokens. An empty token set matches everything.
fn tokens(query: &str, separator: char) -> Vec<String> {
    query
        .split(separator)
        .filter(|t| !t.is_empty())
        .map(str::to_ascii_lowercase)
        .collect()
}

fn matches(projection_lower: &str, tokens: &[String]) -> bool {
    tokens.iter().all(|token| projection_lower.contains(token))
}

/// Scan `items` once, lowering each projection on the fly.
pub fn search<'a, T, P>(
    items: impl IntoIterator<Item = &'a T>,
    projection: P,
    query: &str,
    separator: char,
) -> Vec<&'a T>
where
    P: Fn(&T) -> String,
{
    let tokens = tokens(query, separator);
    items
        .into_iter()
        .filter(|item| matches(&projection(item).to_ascii_lowercase(), &tokens))
        .collect()
}

/// Prepared variant: lowers every projection once, then answers any number
/// of queries. Result sets and order are identical to `search`.
pub struct PreparedSearch<'a, T> {
    entries: Vec<(&'a T, String)>,
}

impl<'a, T> PreparedSearch<'a, T> {
    pub fn new<P>(items: impl IntoIterator<Item = &'a T>, projection: P) -> Self
    where
        P: Fn(&T) -> String,
    {
        let entries = items
            .into_iter()
            .map(|item| (item, projection(item).to_ascii_lowercase()))
            .collect();
        Self { entries }
    }

    pub fn query(&self, query: &str, separator: char) -> Vec<&'a T> {
        let tokens = tokens(query, separator);
        self.entries
            .iter()
            .filter(|(_, lower)| matches(lower, &tokens))
            .map(|(item, _)| *item)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        ["Corp Telemetry Level", "Corp Update Channel", "Net Proxy"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn every_token_must_match_case_insensitively() {
        let items = names();
        let hits = search(&items, |s| s.clone(), "corp TELEMETRY", ' ');
        assert_eq!(hits, vec![&items[0]]);

        let hits = search(&items, |s| s.clone(), "corp missing", ' ');
        assert!(hits.is_empty());
    }

    #[test]
    fn empty_query_matches_everything() {
        let items = names();
        let hits = search(&items, |s| s.clone(), "", ' ');
        assert_eq!(hits.len(), items.len());
        // separators only is the same as empty
        let hits = search(&items, |s| s.clone(), "   ", ' ');
        assert_eq!(hits.len(), items.len());
    }

    #[test]
    fn results_keep_input_order() {
        let items = names();
        let hits = search(&items, |s| s.clone(), "corp", ' ');
        assert_eq!(hits, vec![&items[0], &items[1]]);
    }

    #[test]
    fn strategies_agree() {
        let items = names();
        let prepared = PreparedSearch::new(&items, |s: &String| s.clone());
        for query in ["", "corp", "corp update", "NET proxy", "zzz", "e l"] {
            let scanned = search(&items, |s| s.clone(), query, ' ');
            let indexed = prepared.query(query, ' ');
            assert_eq!(scanned, indexed, "query {query:?}");
        }
    }
}
