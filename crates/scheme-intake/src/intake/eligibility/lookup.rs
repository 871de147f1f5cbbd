use super::super::domain::Scheme;

/// Name lookup used for direct scheme questions; eligibility is not consulted.
///
/// Matching is case-insensitive like SQLite `LIKE`. An exact name wins outright,
/// otherwise every scheme containing the query is returned in catalog order.
pub fn match_by_name(schemes: &[Scheme], query: &str) -> Vec<Scheme> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }

    if let Some(exact) = schemes
        .iter()
        .find(|scheme| scheme.name.to_lowercase() == needle)
    {
        return vec![exact.clone()];
    }

    schemes
        .iter()
        .filter(|scheme| scheme.name.to_lowercase().contains(&needle))
        .cloned()
        .collect()
}
