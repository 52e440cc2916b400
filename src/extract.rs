//! DOM helpers shared by the source-specific extractors.
//!
//! Upstream markup drifts between template versions, so every field is read
//! through a [`SelectorChain`]: an ordered list of alternative locations where
//! the first one that yields something wins.

use scraper::{ElementRef, Html, Selector};

use crate::error::Result;
use crate::normalize::collapse_whitespace;

/// Ordered fallback selectors for one field.
pub(crate) struct SelectorChain {
    selectors: Vec<Selector>,
}

impl SelectorChain {
    pub(crate) fn new(candidates: &[&str]) -> Result<Self> {
        let selectors = candidates
            .iter()
            .map(|c| Selector::parse(c))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { selectors })
    }

    /// First element matched by the first selector that matches anything.
    pub(crate) fn first<'a>(&self, scope: &ElementRef<'a>) -> Option<ElementRef<'a>> {
        self.selectors.iter().find_map(|s| scope.select(s).next())
    }

    /// All elements matched by the first selector that matches anything.
    pub(crate) fn all<'a>(&self, scope: &ElementRef<'a>) -> Vec<ElementRef<'a>> {
        self.selectors
            .iter()
            .map(|s| scope.select(s).collect::<Vec<_>>())
            .find(|found| !found.is_empty())
            .unwrap_or_default()
    }

    /// Text of the first match with non-empty text, across all selectors.
    pub(crate) fn text(&self, scope: &ElementRef) -> Option<String> {
        self.selectors.iter().find_map(|s| {
            scope
                .select(s)
                .map(|e| element_text(&e))
                .find(|t| !t.is_empty())
        })
    }

    /// Text of the first text node of the first match, ignoring nested
    /// labels such as "PICK" badges or series names.
    pub(crate) fn leading_text(&self, scope: &ElementRef) -> Option<String> {
        self.selectors.iter().find_map(|s| {
            scope
                .select(s)
                .map(|e| select_text(&e))
                .find(|t| !t.is_empty())
        })
    }

    /// Attribute value of the first match carrying a non-empty `attr`.
    pub(crate) fn attr(&self, scope: &ElementRef, attr: &str) -> Option<String> {
        self.selectors.iter().find_map(|s| {
            scope
                .select(s)
                .filter_map(|e| e.value().attr(attr))
                .map(str::trim)
                .find(|v| !v.is_empty())
                .map(str::to_string)
        })
    }
}

/// Parse a whole page and hand its root element to `parse`.
pub(crate) fn with_document<T>(
    body: &str,
    parse: impl FnOnce(&ElementRef) -> Result<T>,
) -> Result<T> {
    let document = Html::parse_document(body);
    parse(&document.root_element())
}

/// Extract trimmed text from the first non-empty text node of `element`.
pub(crate) fn select_text(element: &ElementRef) -> String {
    element
        .text()
        .map(|t| t.trim())
        .find(|t| !t.is_empty())
        .unwrap_or_default()
        .replace(['\n', '\t'], "")
        .to_string()
}

/// All text below `element`, whitespace-collapsed.
pub(crate) fn element_text(element: &ElementRef) -> String {
    collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

/// `Some(text)` unless the text is blank.
pub(crate) fn non_empty(text: String) -> Option<String> {
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// The `<title>` text up to the first of `separators`, used as a last-resort
/// name source (`"aspas: Valorant Player Profile | VLR.gg"` -> `"aspas"`).
pub(crate) fn title_prefix(root: &ElementRef, separators: &[char]) -> Option<String> {
    let title = SelectorChain::new(&["title"]).ok()?.text(root)?;
    let (prefix, _) = title.split_once(separators)?;
    non_empty(prefix.to_string())
}

/// Whether the page is the site's soft 404.
pub(crate) fn is_not_found_page(root: &ElementRef) -> bool {
    root.text().any(|t| t.contains("Page not found"))
}

/// The path segment following `prefix` in an href.
///
/// `id_after("/team/2/sentinels", "/team/")` is `Some("2")`. Absolute URLs are
/// accepted as well.
pub(crate) fn id_after(href: &str, prefix: &str) -> Option<String> {
    let (_, rest) = href.split_once(prefix)?;
    rest.split(['/', '?', '#'])
        .next()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// The first path segment of a site-relative href (`"/12345/a-vs-b"` -> `"12345"`).
pub(crate) fn first_segment(href: &str) -> Option<String> {
    let path = match href.split_once("://") {
        Some((_, rest)) => rest.split_once('/').map(|(_, p)| p).unwrap_or_default(),
        None => href.trim_start_matches('/'),
    };
    path.split(['/', '?', '#'])
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Normalize a potentially relative URL to an absolute one on `base`.
pub(crate) fn absolute_url(base: &str, src: &str) -> String {
    if src.starts_with("//") {
        format!("https:{src}")
    } else if src.starts_with('/') {
        format!("{base}{src}")
    } else if src.starts_with("http://") || src.starts_with("https://") {
        src.to_string()
    } else {
        format!("{base}/{src}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"
        <html><head><title>aspas: Valorant Player Profile | VLR.gg</title></head>
        <body>
          <div class="header"><h1 class="new-title"> Sentinels </h1></div>
          <div class="card"><span class="name">TenZ <em>PICK</em></span></div>
          <img class="logo" src="//owcdn.net/img/logo.png">
          <img class="empty" src="">
        </body></html>
    "#;

    #[test]
    fn test_chain_falls_through_to_later_selector() {
        let document = Html::parse_document(FIXTURE);
        let root = document.root_element();
        let chain =
            SelectorChain::new(&[".team-header-name", "h1.wf-title", "h1.new-title"]).unwrap();
        assert_eq!(chain.text(&root).as_deref(), Some("Sentinels"));

        let missing = SelectorChain::new(&[".nope", ".nothing"]).unwrap();
        assert_eq!(missing.text(&root), None);
        assert!(missing.first(&root).is_none());
        assert!(missing.all(&root).is_empty());
    }

    #[test]
    fn test_leading_text_skips_nested_badges() {
        let document = Html::parse_document(FIXTURE);
        let root = document.root_element();
        let chain = SelectorChain::new(&["span.name"]).unwrap();
        assert_eq!(chain.leading_text(&root).as_deref(), Some("TenZ"));
        assert_eq!(chain.text(&root).as_deref(), Some("TenZ PICK"));
    }

    #[test]
    fn test_attr_skips_empty_values() {
        let document = Html::parse_document(FIXTURE);
        let root = document.root_element();
        let chain = SelectorChain::new(&["img.empty", "img.logo"]).unwrap();
        assert_eq!(
            chain.attr(&root, "src").as_deref(),
            Some("//owcdn.net/img/logo.png")
        );
    }

    #[test]
    fn test_title_prefix() {
        let document = Html::parse_document(FIXTURE);
        assert_eq!(
            title_prefix(&document.root_element(), &[':', '|']).as_deref(),
            Some("aspas")
        );
    }

    #[test]
    fn test_href_ids() {
        assert_eq!(id_after("/team/2/sentinels", "/team/").as_deref(), Some("2"));
        assert_eq!(
            id_after("https://www.vlr.gg/player/9/tenz", "/player/").as_deref(),
            Some("9")
        );
        assert_eq!(id_after("/team/", "/team/"), None);
        assert_eq!(first_segment("/353177/sentinels-vs-g2").as_deref(), Some("353177"));
        assert_eq!(
            first_segment("https://www.vlr.gg/353177/sentinels-vs-g2").as_deref(),
            Some("353177")
        );
    }

    #[test]
    fn test_absolute_url() {
        assert_eq!(
            absolute_url("https://www.vlr.gg", "//owcdn.net/a.png"),
            "https://owcdn.net/a.png"
        );
        assert_eq!(
            absolute_url("https://www.vlr.gg", "/img/vlr/tmp/vlr.png"),
            "https://www.vlr.gg/img/vlr/tmp/vlr.png"
        );
        assert_eq!(
            absolute_url("https://www.vlr.gg", "https://cdn.example/x.png"),
            "https://cdn.example/x.png"
        );
    }
}
