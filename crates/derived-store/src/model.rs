/// `{entityName, id, data, validFrom, validTo}` (§3). `valid_to = None` is
/// the spec's `validTo = ∞`: exactly one live row per `(entityName, id)`.
#[derive(Clone, Debug, PartialEq)]
pub struct EntityRow {
    pub entity_name: String,
    pub id: Vec<u8>,
    pub data: serde_json::Value,
    pub valid_from: i64,
    pub valid_to: Option<i64>,
}
