use crate::error::{MirrorError, MirrorResult};
use itertools::Itertools;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use std::fmt;
use tracing::warn;

pub type Rank = u32;

// Country code as used by the leaderboard `country` query parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(from = "String")]
pub struct Country(String);

impl Country {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Country {
    fn from(code: String) -> Self {
        Country(code.trim().to_string())
    }
}

impl From<&str> for Country {
    fn from(code: &str) -> Self {
        Country(code.trim().to_string())
    }
}

impl fmt::Display for Country {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LeaderboardEntry {
    pub name: String,
    pub rank: Rank,
    pub country: Country,
}

impl LeaderboardEntry {
    /// Builds an entry from the text of a table row: rank cell first, name cell second,
    /// any further columns ignored.
    pub fn from_cells(cells: &[String], country: &Country) -> MirrorResult<Self> {
        let (rank_cell, name_cell) = match cells {
            [rank, name, ..] => (rank, name),
            _ => {
                return Err(MirrorError::Parse(format!(
                    "expected at least 2 cells, found {}",
                    cells.len()
                )))
            }
        };

        let rank = rank_cell
            .trim_start_matches('#')
            .trim()
            .parse::<Rank>()
            .ok()
            .filter(|rank| *rank > 0)
            .ok_or_else(|| MirrorError::Parse(format!("invalid rank '{}'", rank_cell)))?;

        let name = strip_team_suffix(name_cell);
        if name.is_empty() {
            return Err(MirrorError::Parse(format!("empty player name in '{}'", name_cell)));
        }

        Ok(LeaderboardEntry {
            name: name.to_string(),
            rank,
            country: country.clone(),
        })
    }
}

/// "Carol (TeamX)" => "Carol"
pub fn strip_team_suffix(name: &str) -> &str {
    match name.find('(') {
        Some(idx) => name[..idx].trim(),
        None => name.trim(),
    }
}

/// Parsing of one listing page. Header row is skipped, malformed rows are logged and
/// dropped, entries come back in row order.
pub fn parse_listing(html: &str, country: &Country) -> MirrorResult<Vec<LeaderboardEntry>> {
    let rows = table_rows(html)?;
    let entries = rows
        .iter()
        .enumerate()
        .filter_map(|(idx, cells)| match LeaderboardEntry::from_cells(cells, country) {
            Ok(entry) => Some(entry),
            Err(e) => {
                // +2: one for the header, one for 1-based row numbers
                warn!("Skipping row {} of {} listing. {e}", idx + 2, country);
                None
            }
        })
        .collect();
    Ok(entries)
}

/// Rank of `name` in a name search result. Search is fuzzy upstream, so only a row whose
/// stripped name equals `name` counts; no such row means the rank is unresolved.
pub fn parse_live_rank(html: &str, country: &Country, name: &str) -> MirrorResult<Option<Rank>> {
    let rows = table_rows(html)?;
    let wanted = name.trim();
    let rank = rows
        .iter()
        .filter_map(|cells| LeaderboardEntry::from_cells(cells, country).ok())
        .find(|entry| entry.name == wanted)
        .map(|entry| entry.rank);
    Ok(rank)
}

// Text of every cell of every data row of the leaderboard table.
fn table_rows(html: &str) -> MirrorResult<Vec<Vec<String>>> {
    let document = Html::parse_document(html);
    let selector_table = Selector::parse(r#"div.block-table table"#).unwrap();
    let selector_row = Selector::parse("tr").unwrap();
    let selector_cell = Selector::parse("td, th").unwrap();

    let table = document
        .select(&selector_table)
        .next()
        .ok_or_else(|| MirrorError::Parse("leaderboard table not found".to_string()))?;

    let rows: Vec<Vec<String>> = table
        .select(&selector_row)
        // first row is the header
        .skip(1)
        .map(|row| row.select(&selector_cell).map(cell_text).collect())
        .collect();
    Ok(rows)
}

fn cell_text(cell: ElementRef) -> String {
    cell.text().flat_map(str::split_whitespace).join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(rows: &str) -> String {
        format!(
            r#"<html><body>
            <div class="block-table">
              <table>
                <tr><th>Rank</th><th>Player</th><th>XP</th></tr>
                {rows}
              </table>
            </div>
            </body></html>"#
        )
    }

    fn gb() -> Country {
        Country::from("GB")
    }

    #[test]
    fn listing_rows_are_parsed_and_team_tags_stripped() {
        let html = page(
            "<tr><td>1</td><td>Carol (TeamX)</td><td>120</td></tr>\
             <tr><td>2</td><td>Dan</td><td>98</td></tr>",
        );
        let entries = parse_listing(&html, &gb()).unwrap();

        assert_eq!(
            entries,
            vec![
                LeaderboardEntry { name: "Carol".to_string(), rank: 1, country: gb() },
                LeaderboardEntry { name: "Dan".to_string(), rank: 2, country: gb() },
            ]
        );
    }

    #[test]
    fn names_spread_over_nested_markup_are_collapsed() {
        let html = page("<tr><td> 7 </td><td><a href=\"/p/1\">Mary\n  Ann</a> (Pod)</td></tr>");
        let entries = parse_listing(&html, &gb()).unwrap();
        assert_eq!(entries[0].name, "Mary Ann");
        assert_eq!(entries[0].rank, 7);
    }

    #[test]
    fn header_only_table_gives_no_entries() {
        let entries = parse_listing(&page(""), &gb()).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let html = page(
            "<tr><td>one</td><td>Eve</td></tr>\
             <tr><td>3</td></tr>\
             <tr><td>0</td><td>Zero</td></tr>\
             <tr><td>4</td><td>(Tag only)</td></tr>\
             <tr><td>5</td><td>Frank</td></tr>",
        );
        let entries = parse_listing(&html, &gb()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "Frank");
    }

    #[test]
    fn missing_table_is_a_parse_error() {
        let err = parse_listing("<html><body><p>maintenance</p></body></html>", &gb()).unwrap_err();
        assert!(matches!(err, MirrorError::Parse(_)));
    }

    #[test]
    fn live_rank_uses_exact_name_match() {
        let html = page(
            "<tr><td>3</td><td>Bobby (Red)</td></tr>\
             <tr><td>9</td><td>Bob</td></tr>",
        );
        assert_eq!(parse_live_rank(&html, &gb(), "Bob").unwrap(), Some(9));
    }

    #[test]
    fn live_rank_without_exact_match_is_unresolved() {
        let html = page("<tr><td>3</td><td>Bobby</td></tr>");
        assert_eq!(parse_live_rank(&html, &gb(), "Bob").unwrap(), None);
        assert_eq!(parse_live_rank(&page(""), &gb(), "Bob").unwrap(), None);
    }

    #[test]
    fn strip_team_suffix_keeps_plain_names() {
        assert_eq!(strip_team_suffix("  Alice "), "Alice");
        assert_eq!(strip_team_suffix("Carol (TeamX)"), "Carol");
        assert_eq!(strip_team_suffix("(TeamX)"), "");
    }
}
