use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A condensed listing record attached to an assistant reply.
///
/// References let a caller link back to the full listing.  Numeric fields the
/// backend could not determine are `None` rather than zero; missing text
/// fields read as empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ListingReference {
    /// Listing identifier.
    pub id: String,
    /// Listing headline.
    pub title: String,
    /// Asking price or rent.
    pub price: Option<f64>,
    /// City the listing is in.
    pub city: String,
    /// Neighborhood or locality within the city.
    pub locality: String,
    /// State or region.
    pub state: String,
    /// Sale, rent, and so on.
    pub listing_type: String,
    /// Apartment, villa, plot, and so on.
    pub property_type: String,
    /// Number of bedrooms.
    pub bedrooms: Option<f64>,
    /// Number of bathrooms; half baths make this fractional.
    pub bathrooms: Option<f64>,
    /// Built-up area.
    pub area: Option<f64>,
    /// URL slug of the listing page.
    pub slug: String,
}

impl ListingReference {
    /// Read a `references` field leniently.
    ///
    /// Absent, `null` or non-array values give no references; elements that
    /// fail to decode are skipped one by one.
    pub fn list_from(value: Option<&Value>) -> Vec<Self> {
        let Some(Value::Array(items)) = value else {
            if let Some(other) = value.filter(|v| !v.is_null()) {
                tracing::warn!(references = %other, "ignoring non-array references");
            }
            return Vec::new();
        };
        items
            .iter()
            .filter_map(|item| match Self::deserialize(item) {
                Ok(reference) => Some(reference),
                Err(err) => {
                    tracing::warn!(error = %err, "skipping malformed reference");
                    None
                }
            })
            .collect()
    }

    /// Serde adapter applying [`ListingReference::list_from`] to a field.
    pub fn deserialize_list<'de, D>(deserializer: D) -> Result<Vec<Self>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(Self::list_from(value.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_nullable_numbers() {
        let json = json!({
            "id": "l-1",
            "title": "Sunny 2BHK",
            "price": null,
            "city": "Pune",
            "locality": "Baner",
            "state": "MH",
            "listingType": "rent",
            "propertyType": "apartment",
            "bedrooms": 2,
            "bathrooms": null,
            "area": 950.5,
            "slug": "sunny-2bhk"
        });

        let reference: ListingReference = serde_json::from_value(json).unwrap();
        assert_eq!(reference.price, None);
        assert_eq!(reference.bedrooms, Some(2.0));
        assert_eq!(reference.bathrooms, None);
        assert_eq!(reference.area, Some(950.5));
        assert_eq!(reference.listing_type, "rent");
    }

    #[test]
    fn lenient_lists() {
        assert!(ListingReference::list_from(None).is_empty());
        assert!(ListingReference::list_from(Some(&Value::Null)).is_empty());
        assert!(ListingReference::list_from(Some(&json!("nope"))).is_empty());
        let list = ListingReference::list_from(Some(&json!([{"id": "l-9", "title": "Plot"}])));
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, "l-9");
        assert_eq!(list[0].city, "");
    }

    #[test]
    fn half_baths_decode() {
        let response: crate::types::ChatResponse = serde_json::from_value(json!({
            "reply": "One match.",
            "references": [{"id": "1", "bedrooms": 3, "bathrooms": 2.5}]
        }))
        .unwrap();
        assert_eq!(response.references[0].bedrooms, Some(3.0));
        assert_eq!(response.references[0].bathrooms, Some(2.5));

        let response: crate::types::ChatResponse = serde_json::from_value(json!({
            "reply": "Two matches.",
            "references": [{"id": "a"}, {"id": false}]
        }))
        .unwrap();
        assert_eq!(response.references.len(), 1);
    }

    #[test]
    fn one_bad_reference_does_not_drop_the_rest() {
        let list = ListingReference::list_from(Some(&json!([
            {"id": "ok"},
            {"id": "1", "bedrooms": 3, "bathrooms": 2.5},
            {"id": 7, "title": ["not", "text"]}
        ])));
        let ids: Vec<&str> = list.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["ok", "1"]);
        assert_eq!(list[1].bathrooms, Some(2.5));
    }
}
