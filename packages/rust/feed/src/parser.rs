//! RSS 2.0, RSS 1.0 (RDF), and Atom parsing into [`DocumentRecord`]s.
//!
//! All three shapes are read with one `quick-xml` serde model: RSS 2.0 nests
//! items under `<channel>`, RSS 1.0 places them directly under `<rdf:RDF>`,
//! and Atom uses `<entry>` under `<feed>`. Whichever shape the document has,
//! the other collections simply stay empty.

use quick_xml::de::from_str;
use serde::Deserialize;

use paperfilter_shared::{DocumentRecord, PaperFilterError, Result, UNKNOWN_AUTHORS};

#[derive(Debug, Deserialize)]
struct FeedDocument {
    #[serde(default)]
    channel: Option<Channel>,
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    description: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    /// `<dc:date>`; the deserializer matches local names only.
    #[serde(rename = "date")]
    dc_date: Option<String>,
    /// `<dc:creator>`, one element per author or one comma-joined list.
    #[serde(rename = "creator", default)]
    creators: Vec<String>,
    author: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<String>,
    summary: Option<String>,
    published: Option<String>,
    updated: Option<String>,
    #[serde(rename = "author", default)]
    authors: Vec<AtomPerson>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
}

#[derive(Debug, Deserialize)]
struct AtomPerson {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: String,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

/// Parse a feed document, keeping entries in document order.
///
/// Entries with neither a title nor a link are dropped.
pub fn parse_feed(xml: &str) -> Result<Vec<DocumentRecord>> {
    let doc: FeedDocument =
        from_str(xml).map_err(|e| PaperFilterError::parse(format!("feed xml: {e}")))?;

    let rss_items = doc
        .channel
        .map(|c| c.items)
        .unwrap_or_default()
        .into_iter()
        .chain(doc.items)
        .map(RssItem::into_record);

    let atom_items = doc.entries.into_iter().map(AtomEntry::into_record);

    Ok(rss_items
        .chain(atom_items)
        .filter(|r| !r.title.is_empty() || !r.link.is_empty())
        .collect())
}

impl RssItem {
    fn into_record(self) -> DocumentRecord {
        let authors = if self.creators.is_empty() {
            self.author.into_iter().collect()
        } else {
            self.creators
        };

        DocumentRecord {
            title: collapse(self.title.as_deref()),
            authors: join_authors(authors),
            summary: trimmed(self.description),
            published: trimmed(self.pub_date.or(self.dc_date)),
            link: trimmed(self.link),
        }
    }
}

impl AtomEntry {
    fn into_record(self) -> DocumentRecord {
        let link = self
            .links
            .iter()
            .find(|l| l.rel.as_deref().is_none_or(|rel| rel == "alternate"))
            .or_else(|| self.links.first())
            .map(|l| l.href.trim().to_string())
            .unwrap_or_default();

        DocumentRecord {
            title: collapse(self.title.as_deref()),
            authors: join_authors(self.authors.into_iter().filter_map(|a| a.name).collect()),
            summary: trimmed(self.summary),
            published: trimmed(self.published.or(self.updated)),
            link,
        }
    }
}

fn join_authors(names: Vec<String>) -> String {
    let names: Vec<String> = names
        .iter()
        .map(|n| collapse(Some(n)))
        .filter(|n| !n.is_empty())
        .collect();

    if names.is_empty() {
        UNKNOWN_AUTHORS.to_string()
    } else {
        names.join(", ")
    }
}

fn trimmed(value: Option<String>) -> String {
    value.map(|v| v.trim().to_string()).unwrap_or_default()
}

/// Trim and fold line-wrapped text (Atom titles) onto one line.
fn collapse(value: Option<&str>) -> String {
    value
        .map(|v| v.split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_fixture(name: &str) -> String {
        let path = format!("../../../fixtures/feeds/{name}");
        std::fs::read_to_string(&path).unwrap_or_else(|_| panic!("missing fixture: {path}"))
    }

    #[test]
    fn parses_rss2_in_feed_order() {
        let records = parse_feed(&load_fixture("arxiv_rss2.xml")).expect("parse");
        assert_eq!(records.len(), 3);

        let first = &records[0];
        assert_eq!(first.title, "Language Model Agents for Portfolio Rebalancing");
        assert_eq!(first.authors, "Ada Lovelace, Alan Turing");
        assert_eq!(first.link, "https://arxiv.org/abs/2501.01234");
        assert_eq!(first.published, "Mon, 06 Jan 2025 00:00:00 -0500");
        assert!(first.summary.contains("equity portfolios & report risk"));

        assert_eq!(records[1].title, "Symbolic Planning in Gridworlds");
        // No dc:creator on the third item
        assert_eq!(records[2].authors, "Unknown");
        assert!(records[2].summary.contains("<b>credit risk</b>"));
    }

    #[test]
    fn parses_rdf_items_outside_channel() {
        let records = parse_feed(&load_fixture("arxiv_rdf.xml")).expect("parse");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].authors, "Katherine Johnson");
        assert_eq!(records[0].published, "2023-12-01T00:00:00-05:00");
        assert_eq!(records[0].summary, "<p>We combine retrieval with LLM reasoning for trading.</p>");
        assert_eq!(records[1].published, "");
        assert_eq!(records[1].link, "http://arxiv.org/abs/2312.00002/");
    }

    #[test]
    fn parses_atom_entries() {
        let records = parse_feed(&load_fixture("arxiv_atom.xml")).expect("parse");
        assert_eq!(records.len(), 3);

        let first = &records[0];
        assert_eq!(first.title, "Hedging with Reinforcement Learning");
        assert_eq!(first.authors, "Emmy Noether, John von Neumann");
        assert_eq!(first.summary, "We learn hedging policies for options books.");
        assert_eq!(first.published, "2025-01-03T12:00:00Z");
        assert_eq!(first.link, "http://arxiv.org/abs/2501.04321v2");

        let second = &records[1];
        assert_eq!(second.published, "2025-01-04T10:00:00Z");
        assert_eq!(second.authors, "Unknown");
        assert_eq!(second.summary, "");
    }

    #[test]
    fn atom_links_split_by_other_elements() {
        let records = parse_feed(&load_fixture("arxiv_atom.xml")).expect("parse");
        let third = &records[2];
        assert_eq!(third.title, "Credit Scoring with Graph Transformers");
        assert_eq!(third.link, "http://arxiv.org/abs/2501.04323v1");
        assert_eq!(third.authors, "Mary Cartwright, Sofia Kovalevskaya");
    }

    #[test]
    fn dublin_core_fields_are_read() {
        let xml = r#"<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
                xmlns="http://purl.org/rss/1.0/"
                xmlns:dc="http://purl.org/dc/elements/1.1/">
            <item rdf:about="http://arxiv.org/abs/2312.00009">
                <title>Dublin Core Item</title>
                <link>http://arxiv.org/abs/2312.00009</link>
                <dc:creator>Katherine Johnson</dc:creator>
                <dc:creator>Dorothy Vaughan</dc:creator>
                <dc:date>2023-12-01T00:00:00-05:00</dc:date>
            </item>
        </rdf:RDF>"#;
        let records = parse_feed(xml).expect("parse");
        assert_eq!(records[0].authors, "Katherine Johnson, Dorothy Vaughan");
        assert_eq!(records[0].published, "2023-12-01T00:00:00-05:00");
    }

    #[test]
    fn empty_channel_yields_no_records() {
        let xml = r#"<?xml version="1.0"?><rss version="2.0"><channel><title>Empty</title></channel></rss>"#;
        assert!(parse_feed(xml).expect("parse").is_empty());
    }

    #[test]
    fn entries_without_title_or_link_are_dropped() {
        let xml = r#"<rss version="2.0"><channel>
            <item><description>orphan</description></item>
            <item><title>Kept</title></item>
        </channel></rss>"#;
        let records = parse_feed(xml).expect("parse");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Kept");
    }

    #[test]
    fn malformed_xml_is_a_parse_error() {
        let err = parse_feed("<rss><channel><item></channel></rss>").unwrap_err();
        assert!(matches!(err, PaperFilterError::Parse { .. }));
    }
}
