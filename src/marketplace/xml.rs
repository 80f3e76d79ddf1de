//! Trading API `GetCategories` request building and response parsing

use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;

use super::{CategoryTreeSnapshot, MarketplaceError, MarketplaceResult};
use crate::models::Category;

const OPERATION: &str = "GetCategories";

/// Build a `GetCategories` request body
///
/// Without `full_tree` only the header fields (including `CategoryVersion`)
/// come back.
pub fn get_categories_request(user_token: &str, site_id: u32, full_tree: bool) -> String {
    let detail = if full_tree {
        "\n  <DetailLevel>ReturnAll</DetailLevel>\n  <ViewAllNodes>true</ViewAllNodes>"
    } else {
        ""
    };

    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<GetCategoriesRequest xmlns="urn:ebay:apis:eBLBaseComponents">
  <RequesterCredentials>
    <eBayAuthToken>{token}</eBayAuthToken>
  </RequesterCredentials>
  <CategorySiteID>{site_id}</CategorySiteID>{detail}
</GetCategoriesRequest>"#,
        token = escape(user_token),
    )
}

#[derive(Default)]
struct CategoryFields {
    id: Option<String>,
    parent_id: Option<String>,
    name: Option<String>,
    level: Option<String>,
    expired: bool,
}

impl CategoryFields {
    fn finish(self) -> MarketplaceResult<Category> {
        let id = self
            .id
            .ok_or_else(|| MarketplaceError::Decode("Category without CategoryID".into()))?;

        let level = match self.level {
            Some(raw) => raw.parse::<u32>().map_err(|_| {
                MarketplaceError::Decode(format!("invalid CategoryLevel '{raw}' for {id}"))
            })?,
            None => {
                return Err(MarketplaceError::Decode(format!(
                    "Category {id} without CategoryLevel"
                )))
            }
        };

        Ok(Category {
            name: self.name.unwrap_or_default(),
            parent_id: self.parent_id,
            level,
            expired: self.expired,
            id,
        })
    }
}

/// Parse a `GetCategories` response
///
/// `Ack=Failure` becomes [`MarketplaceError::Api`] carrying the first error
/// message. A response without a `CategoryVersion` is rejected.
pub fn parse_get_categories(xml: &str) -> MarketplaceResult<CategoryTreeSnapshot> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut ack = None;
    let mut version = None;
    let mut error_message: Option<String> = None;
    let mut categories = Vec::new();

    let mut current: Option<CategoryFields> = None;
    let mut in_errors = false;
    let mut current_tag = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                match name.as_str() {
                    "Category" => current = Some(CategoryFields::default()),
                    "Errors" => in_errors = true,
                    _ => {}
                }
                current_tag = name;
            }
            Event::End(e) => {
                let name = e.local_name();
                match name.as_ref() {
                    b"Category" => {
                        if let Some(fields) = current.take() {
                            categories.push(fields.finish()?);
                        }
                    }
                    b"Errors" => in_errors = false,
                    _ => {}
                }
                current_tag.clear();
            }
            Event::Text(e) => {
                let text = e
                    .unescape()
                    .map_err(|err| MarketplaceError::Decode(err.to_string()))?
                    .into_owned();

                if let Some(fields) = current.as_mut() {
                    match current_tag.as_str() {
                        "CategoryID" => fields.id = Some(text),
                        "CategoryParentID" => fields.parent_id = Some(text),
                        "CategoryName" => fields.name = Some(text),
                        "CategoryLevel" => fields.level = Some(text),
                        "Expired" => fields.expired = text.eq_ignore_ascii_case("true"),
                        _ => {}
                    }
                } else if in_errors {
                    // LongMessage wins over ShortMessage when both are present
                    match current_tag.as_str() {
                        "LongMessage" => error_message = Some(text),
                        "ShortMessage" if error_message.is_none() => error_message = Some(text),
                        _ => {}
                    }
                } else {
                    match current_tag.as_str() {
                        "Ack" => ack = Some(text),
                        "CategoryVersion" => version = Some(text),
                        _ => {}
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if ack.as_deref() == Some("Failure") {
        return Err(MarketplaceError::api(
            OPERATION,
            error_message.unwrap_or_else(|| "unspecified failure".to_string()),
        ));
    }

    let version = version
        .ok_or_else(|| MarketplaceError::Decode("response carries no CategoryVersion".into()))?;

    Ok(CategoryTreeSnapshot {
        version,
        categories,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_RESPONSE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<GetCategoriesResponse xmlns="urn:ebay:apis:eBLBaseComponents">
  <Timestamp>2024-01-01T00:00:00.000Z</Timestamp>
  <Ack>Success</Ack>
  <CategoryArray>
    <Category>
      <BestOfferEnabled>true</BestOfferEnabled>
      <CategoryID>20081</CategoryID>
      <CategoryLevel>1</CategoryLevel>
      <CategoryName>Antiques</CategoryName>
      <CategoryParentID>20081</CategoryParentID>
    </Category>
    <Category>
      <CategoryID>37903</CategoryID>
      <CategoryLevel>2</CategoryLevel>
      <CategoryName>Antiquities &amp; Relics</CategoryName>
      <CategoryParentID>20081</CategoryParentID>
    </Category>
    <Category>
      <CategoryID>99</CategoryID>
      <CategoryLevel>1</CategoryLevel>
      <CategoryName>Retired</CategoryName>
      <CategoryParentID>99</CategoryParentID>
      <Expired>true</Expired>
    </Category>
  </CategoryArray>
  <CategoryCount>3</CategoryCount>
  <CategoryVersion>117</CategoryVersion>
</GetCategoriesResponse>"#;

    #[test]
    fn test_parse_full_tree() {
        let snapshot = parse_get_categories(FULL_RESPONSE).unwrap();
        assert_eq!(snapshot.version, "117");
        assert_eq!(snapshot.categories.len(), 3);

        let relics = &snapshot.categories[1];
        assert_eq!(relics.id, "37903");
        assert_eq!(relics.name, "Antiquities & Relics");
        assert_eq!(relics.parent_id.as_deref(), Some("20081"));
        assert_eq!(relics.level, 2);
        assert!(!relics.expired);

        assert!(snapshot.categories[0].is_root());
        assert!(snapshot.categories[2].expired);
    }

    #[test]
    fn test_parse_version_only() {
        let xml = r#"<GetCategoriesResponse xmlns="urn:ebay:apis:eBLBaseComponents">
  <Ack>Success</Ack>
  <CategoryVersion>118</CategoryVersion>
</GetCategoriesResponse>"#;

        let snapshot = parse_get_categories(xml).unwrap();
        assert_eq!(snapshot.version, "118");
        assert!(snapshot.categories.is_empty());
    }

    #[test]
    fn test_parse_failure_ack() {
        let xml = r#"<GetCategoriesResponse xmlns="urn:ebay:apis:eBLBaseComponents">
  <Ack>Failure</Ack>
  <Errors>
    <ShortMessage>Auth token is invalid.</ShortMessage>
    <LongMessage>Validation of the authentication token in API request failed.</LongMessage>
    <ErrorCode>931</ErrorCode>
  </Errors>
</GetCategoriesResponse>"#;

        match parse_get_categories(xml) {
            Err(MarketplaceError::Api { operation, message }) => {
                assert_eq!(operation, "GetCategories");
                assert!(message.contains("authentication token"));
            }
            other => panic!("expected API error, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_version_rejected() {
        let xml = "<GetCategoriesResponse><Ack>Success</Ack></GetCategoriesResponse>";
        assert!(matches!(
            parse_get_categories(xml),
            Err(MarketplaceError::Decode(_))
        ));
    }

    #[test]
    fn test_request_body() {
        let full = get_categories_request("tok<en>", 3, true);
        assert!(full.contains("<CategorySiteID>3</CategorySiteID>"));
        assert!(full.contains("<DetailLevel>ReturnAll</DetailLevel>"));
        assert!(full.contains("tok&lt;en&gt;"));

        let version_only = get_categories_request("token", 0, false);
        assert!(!version_only.contains("DetailLevel"));
    }
}
