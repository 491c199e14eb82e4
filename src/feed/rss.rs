//! RSS 2.0 `<item>` extraction.

use super::parser::{field_text, title_text, Article, ItemParseError};
use super::xml::Element;

pub(crate) fn extract_item(
    item: &Element,
    index: usize,
    subscription_id: &str,
) -> Result<Article, ItemParseError> {
    // RSS carries the link as element text, never as an attribute
    let link = field_text(item, "link").ok_or(ItemParseError::MissingLink { index })?;

    let guid = field_text(item, "guid").unwrap_or_else(|| link.clone());
    let title = title_text(item);
    let description = item
        .find("description")
        .map(Element::inner_markup)
        .unwrap_or_default();
    let published = field_text(item, "pubDate");

    let categories: Vec<String> = item
        .find_all("category")
        .into_iter()
        .map(Element::own_text)
        .filter(|c| !c.is_empty())
        .collect();
    let categories = if categories.is_empty() {
        None
    } else {
        Some(categories.join(", "))
    };

    Ok(Article {
        subscription_id: subscription_id.to_owned(),
        guid,
        title,
        link,
        description,
        published,
        categories,
    })
}
