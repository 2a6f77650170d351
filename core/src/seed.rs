//! Read-only seed data: the instant-render baseline and the last fallback.

use crate::normalize::EventRecord;
use crate::normalize::normalized_title;

/// External collaborator supplying a pre-populated, read-only dataset keyed
/// by region. Consulted for the instant-render baseline on page 1 and as the
/// ultimate fallback when every tier and the cache have nothing.
pub trait SeedProvider: Send + Sync {
    fn seed(&self, region: &str, category: Option<&str>) -> Vec<EventRecord>;
}

/// Seed provider over a fixed in-memory dataset.
pub struct StaticSeedProvider {
    events: Vec<EventRecord>,
}

impl StaticSeedProvider {
    pub fn new(events: Vec<EventRecord>) -> Self {
        Self { events }
    }

    /// A small built-in dataset covering the launch regions. Contents are a
    /// product detail, not an engine one; anything region-shaped works.
    pub fn builtin() -> Self {
        let mk = |region: &str, title: &str, category: &str, venue: &str| EventRecord {
            id: format!(
                "seed-{}-{}",
                region.to_lowercase(),
                normalized_title(title).replace(' ', "-")
            ),
            title: title.to_string(),
            category: category.to_string(),
            description: format!("{title} in {region}."),
            location: region.to_string(),
            venue: Some(venue.to_string()),
            city_name: Some(region.to_string()),
            ..EventRecord::default()
        };
        Self::new(vec![
            mk("Tulsa", "First Friday Art Crawl", "Arts & Culture", "Tulsa Arts District"),
            mk("Tulsa", "Drillers Home Game", "Sports", "ONEOK Field"),
            mk("Tulsa", "Gathering Place Family Day", "Family Activities", "Gathering Place"),
            mk("Oklahoma City", "OKC Thunder Home Game", "Sports", "Paycom Center"),
            mk("Oklahoma City", "Bricktown Canal Nights", "Night Life", "Bricktown"),
            mk(
                "Oklahoma City",
                "Myriad Gardens Concert",
                "Entertainment",
                "Myriad Botanical Gardens",
            ),
            mk("Dallas", "Deep Ellum Live Music", "Night Life", "Deep Ellum"),
            mk("Dallas", "Farmers Market Weekend", "Food & Drink", "Dallas Farmers Market"),
        ])
    }
}

impl SeedProvider for StaticSeedProvider {
    fn seed(&self, region: &str, category: Option<&str>) -> Vec<EventRecord> {
        let region_matches = |record: &EventRecord| {
            region.trim().eq_ignore_ascii_case("all")
                || record
                    .city_name
                    .as_deref()
                    .is_some_and(|city| city.eq_ignore_ascii_case(region.trim()))
        };
        let category_matches = |record: &EventRecord| match category {
            None => true,
            Some(c) if c.eq_ignore_ascii_case("all") => true,
            Some(c) => record.category.eq_ignore_ascii_case(c),
        };
        self.events
            .iter()
            .filter(|record| region_matches(record) && category_matches(record))
            .cloned()
            .collect()
    }
}
