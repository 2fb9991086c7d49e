//! A sortable result-list model over collected entries, ordered per the
//! `sort_order` configuration key.

use crate::config::SortOrder;
use crate::model::BibEntry;
use std::cmp::Ordering;

/// Collected entries of one federated search, exposed in a configurable
/// order.
pub struct Bibliography {
    entries: Vec<BibEntry>,
    sort_order: SortOrder,
}

impl Bibliography {
    #[must_use]
    pub fn new(sort_order: SortOrder) -> Self {
        Self {
            entries: Vec::new(),
            sort_order,
        }
    }

    pub fn push(&mut self, entry: BibEntry) {
        self.entries.push(entry);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn sort_order(&self) -> SortOrder {
        self.sort_order
    }

    pub fn set_sort_order(&mut self, sort_order: SortOrder) {
        self.sort_order = sort_order;
    }

    /// Entries in the configured order.
    #[must_use]
    pub fn sorted(&self) -> Vec<&BibEntry> {
        let mut view: Vec<&BibEntry> = self.entries.iter().collect();
        let order = self.sort_order;
        view.sort_by(|a, b| compare(order, a, b));
        view
    }
}

fn author_key(entry: &BibEntry) -> String {
    entry
        .first_author()
        .map(|p| p.last.to_lowercase())
        .unwrap_or_default()
}

fn year_key(entry: &BibEntry) -> i32 {
    entry
        .field_text(BibEntry::YEAR)
        .parse::<i32>()
        .unwrap_or(0)
}

fn title_key(entry: &BibEntry) -> String {
    entry.field_text(BibEntry::TITLE).to_lowercase()
}

fn compare(order: SortOrder, a: &BibEntry, b: &BibEntry) -> Ordering {
    let by_author = || author_key(a).cmp(&author_key(b));
    let by_title = || title_key(a).cmp(&title_key(b));
    let newest_first = || year_key(b).cmp(&year_key(a));
    let oldest_first = || year_key(a).cmp(&year_key(b));

    match order {
        SortOrder::AuthorNewestTitle => by_author().then_with(newest_first).then_with(by_title),
        SortOrder::AuthorOldestTitle => by_author().then_with(oldest_first).then_with(by_title),
        SortOrder::NewestAuthorTitle => newest_first().then_with(by_author).then_with(by_title),
        SortOrder::OldestAuthorTitle => oldest_first().then_with(by_author).then_with(by_title),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntryKind, Person, ValueItem};

    fn entry(id: &str, author_last: &str, year: &str, title: &str) -> BibEntry {
        let mut e = BibEntry::new(EntryKind::Article, id);
        e.insert(
            BibEntry::AUTHOR,
            vec![ValueItem::Person(Person::new("X", author_last))],
        );
        e.set_plain(BibEntry::YEAR, year);
        e.set_plain(BibEntry::TITLE, title);
        e
    }

    #[test]
    fn author_then_newest() {
        let mut bib = Bibliography::new(SortOrder::AuthorNewestTitle);
        bib.push(entry("1", "Zuse", "1950", "Plankalkuel"));
        bib.push(entry("2", "Aho", "1986", "Compilers"));
        bib.push(entry("3", "Aho", "1974", "Algorithms"));

        let ids: Vec<&str> = bib.sorted().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3", "1"]);
    }

    #[test]
    fn newest_then_author() {
        let mut bib = Bibliography::new(SortOrder::NewestAuthorTitle);
        bib.push(entry("1", "Zuse", "1950", "Plankalkuel"));
        bib.push(entry("2", "Aho", "1986", "Compilers"));
        bib.push(entry("3", "Knuth", "1986", "TeXbook"));

        let ids: Vec<&str> = bib.sorted().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3", "1"]);
    }

    #[test]
    fn missing_fields_sort_last_or_first_deterministically() {
        let mut bib = Bibliography::new(SortOrder::OldestAuthorTitle);
        bib.push(entry("1", "Aho", "1974", "Algorithms"));
        let mut no_year = BibEntry::new(EntryKind::Misc, "2");
        no_year.set_plain(BibEntry::TITLE, "Undated");
        bib.push(no_year);

        let ids: Vec<&str> = bib.sorted().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "1"]);
    }
}
