use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Serialize;

/// Percent-encoding set the inventory upstream expects: everything outside
/// the unreserved characters is escaped, but `/` stays literal.
pub(crate) const UPSTREAM_QUERY_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// Caller-supplied inventory filters. Values are forwarded as-is; the
/// upstream is responsible for rejecting malformed queries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InventoryFilters {
    pub model: String,
    pub market: String,
    pub language: String,
    pub offset: u64,
    pub count: u64,
    pub outside_search: bool,
}

impl Default for InventoryFilters {
    fn default() -> Self {
        Self {
            model: "my".to_string(),
            market: "TR".to_string(),
            language: "tr".to_string(),
            offset: 0,
            count: 50,
            outside_search: true,
        }
    }
}

/// The query document the inventory API expects. Field declaration order is
/// the serialization order, so the serialized shape is deterministic.
#[derive(Debug, Serialize)]
pub struct InventoryQuery {
    query: QuerySection,
    offset: u64,
    count: u64,
    #[serde(rename = "outsideOffset")]
    outside_offset: u64,
    #[serde(rename = "outsideSearch")]
    outside_search: bool,
}

#[derive(Debug, Serialize)]
struct QuerySection {
    model: String,
    condition: &'static str,
    arrangeby: &'static str,
    order: &'static str,
    market: String,
    language: String,
}

impl InventoryQuery {
    pub fn new(filters: &InventoryFilters) -> Self {
        Self {
            query: QuerySection {
                model: filters.model.clone(),
                condition: "new",
                arrangeby: "Price",
                order: "asc",
                market: filters.market.clone(),
                language: filters.language.clone(),
            },
            offset: filters.offset,
            count: filters.count,
            outside_offset: 0,
            outside_search: filters.outside_search,
        }
    }
}

/// Builds the upstream URL: endpoint + `?query=` + percent-encoded compact
/// JSON serialization of the query document.
pub fn build_inventory_url(
    endpoint: &str,
    query: &InventoryQuery,
) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(query)?;
    Ok(format!(
        "{endpoint}?query={}",
        utf8_percent_encode(&json, UPSTREAM_QUERY_SET)
    ))
}
