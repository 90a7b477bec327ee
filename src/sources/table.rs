//! Positional HTML table reading shared by the table-scraping adapters.

use itertools::Itertools;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

static ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").expect("static row selector"));
static HEADER_CELL: Lazy<Selector> = Lazy::new(|| Selector::parse("th").expect("static th selector"));
static CELL: Lazy<Selector> = Lazy::new(|| Selector::parse("td, th").expect("static cell selector"));
static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a").expect("static link selector"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub text: String,
    /// Raw `href`, possibly relative. Empty when the anchor has none.
    pub href: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub text: String,
    pub links: Vec<Link>,
}

impl Cell {
    pub fn first_link(&self) -> Option<&Link> {
        self.links.first()
    }

    /// Organization name and href: the first link's text when the cell has
    /// a link, the cell text otherwise.
    pub fn name_and_href(&self) -> (String, Option<String>) {
        match self.first_link() {
            Some(link) => (
                link.text.clone(),
                Some(link.href.clone()).filter(|h| !h.is_empty()),
            ),
            None => (self.text.clone(), None),
        }
    }
}

pub type Row = Vec<Cell>;

/// Text content with each text node trimmed and joined by a single space.
pub fn element_text(el: ElementRef<'_>) -> String {
    el.text().map(str::trim).filter(|t| !t.is_empty()).join(" ")
}

fn read_cell(el: ElementRef<'_>) -> Cell {
    Cell {
        text: element_text(el),
        links: el
            .select(&LINK)
            .map(|a| Link {
                text: element_text(a),
                href: a.value().attr("href").unwrap_or_default().trim().to_string(),
            })
            .collect(),
    }
}

fn read_rows<'a>(rows: impl Iterator<Item = ElementRef<'a>>) -> Vec<Row> {
    rows.filter(|tr| tr.select(&HEADER_CELL).next().is_none())
        .map(|tr| tr.select(&CELL).map(read_cell).collect())
        .collect()
}

/// Data rows of the first table matching `table`, header rows excluded.
///
/// With `fallback_to_any_row`, a missing table falls back to every `tr` in
/// the document. Returns `None` when no table (or, with the fallback, no row
/// at all) is present.
pub fn find_rows(html: &str, table: &Selector, fallback_to_any_row: bool) -> Option<Vec<Row>> {
    let document = Html::parse_document(html);
    if let Some(found) = document.select(table).next() {
        return Some(read_rows(found.select(&ROW)));
    }
    if !fallback_to_any_row {
        return None;
    }
    let mut rows = document.select(&ROW).peekable();
    rows.peek()?;
    Some(read_rows(rows))
}
