use serde::{Deserialize, Deserializer};

/// Form inputs often post numbers as text, so both `12.5` and `"12.5"` are accepted.
fn amount<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrText {
        Number(f64),
        Text(String),
    }

    match Option::<NumberOrText>::deserialize(d)? {
        None => Ok(None),
        Some(NumberOrText::Number(n)) => Ok(Some(n)),
        Some(NumberOrText::Text(t)) if t.trim().is_empty() => Ok(None),
        Some(NumberOrText::Text(t)) => t
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("amount is not a number: {t:?}"))),
    }
}

/// Distinguishes an explicit `null` (`Some(None)`) from an absent field (`None`).
fn nullable<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Option<String>>, D::Error> {
    Option::<String>::deserialize(d).map(Some)
}

/// POST /expenses. Everything is optional here so missing fields surface as
/// validation errors rather than body rejections.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateExpenseRequest {
    #[serde(deserialize_with = "amount")]
    pub amount: Option<f64>,
    pub category: Option<String>,
    pub date: Option<String>,
    pub description: Option<String>,
}

/// PUT /expenses/:id. Absent fields are left unchanged; unknown fields
/// (including any attempt to change the owner) are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateExpenseRequest {
    #[serde(deserialize_with = "amount")]
    pub amount: Option<f64>,
    pub category: Option<String>,
    pub date: Option<String>,
    /// `null` clears the description.
    #[serde(deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
}

/// GET /expenses query string. Kept as raw text and parsed by the service.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListExpensesQuery {
    pub category: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}
