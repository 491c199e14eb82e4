//! Atom `<entry>` extraction.

use super::parser::{field_text, title_text, Article, ItemParseError};
use super::xml::Element;

pub(crate) fn extract_entry(
    entry: &Element,
    index: usize,
    subscription_id: &str,
) -> Result<Article, ItemParseError> {
    let link = select_link(entry).ok_or(ItemParseError::MissingLink { index })?;

    let guid = field_text(entry, "id").unwrap_or_else(|| link.clone());
    let title = title_text(entry);
    let description = entry
        .find("content")
        .or_else(|| entry.find("summary"))
        .map(Element::inner_markup)
        .unwrap_or_default();
    let published = field_text(entry, "updated").or_else(|| field_text(entry, "published"));

    Ok(Article {
        subscription_id: subscription_id.to_owned(),
        guid,
        title,
        link,
        description,
        published,
        categories: None,
    })
}

/// Picks the entry's link `href`: the first `rel="alternate"` (or rel-less)
/// link, otherwise the first link with any non-empty href.
fn select_link(entry: &Element) -> Option<String> {
    let candidates: Vec<(&str, Option<&str>)> = entry
        .find_all("link")
        .into_iter()
        .filter_map(|link| {
            let href = link.attr("href").map(str::trim).filter(|h| !h.is_empty())?;
            Some((href, link.attr("rel")))
        })
        .collect();

    candidates
        .iter()
        .find(|(_, rel)| rel.map_or(true, |r| r.eq_ignore_ascii_case("alternate")))
        .or_else(|| candidates.first())
        .map(|(href, _)| (*href).to_owned())
}
