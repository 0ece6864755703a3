use crate::registry::{CompiledField, Field, ReadFrom, SourceRules};
use crate::types::RawEvent;
use reqwest::Url;
use scraper::html::Select;
use scraper::{ElementRef, Html};
use tracing::debug;

/// Lazily maps listing elements of one parsed page to [`RawEvent`]s.
///
/// Listings missing a required field are skipped rather than reported; partial
/// pages are normal for these sites.
pub struct Extraction<'a> {
    items: Select<'a, 'a>,
    rules: &'a SourceRules,
    source: &'a str,
    base: Option<Url>,
    dropped: usize,
}

pub fn extract<'a>(
    document: &'a Html,
    rules: &'a SourceRules,
    source: &'a str,
    page_url: &str,
) -> Extraction<'a> {
    Extraction {
        items: document.select(&rules.item),
        rules,
        source,
        base: Url::parse(page_url).ok(),
        dropped: 0,
    }
}

impl<'a> Extraction<'a> {
    /// Number of listings skipped so far for missing required fields
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    fn read_field(&self, item: ElementRef<'_>, rule: &CompiledField) -> Option<String> {
        rule.candidates.iter().find_map(|candidate| {
            item.select(candidate)
                .find_map(|el| self.read_value(el, rule))
        })
    }

    fn read_value(&self, el: ElementRef<'_>, rule: &CompiledField) -> Option<String> {
        let value = match &rule.read {
            ReadFrom::Text => collapse_whitespace(&el.text().collect::<Vec<_>>().join(" ")),
            ReadFrom::Attr(name) => el.value().attr(name)?.trim().to_string(),
        };
        if value.is_empty() {
            return None;
        }
        match rule.field {
            Field::ImageUrl | Field::SourceUrl => Some(self.absolutize(&value)),
            _ => Some(value),
        }
    }

    fn absolutize(&self, value: &str) -> String {
        match &self.base {
            Some(base) => base
                .join(value)
                .map(|u| u.to_string())
                .unwrap_or_else(|_| value.to_string()),
            None => value.to_string(),
        }
    }

    fn extract_item(&self, item: ElementRef<'_>) -> Option<RawEvent> {
        let mut raw = RawEvent {
            source: self.source.to_string(),
            ..RawEvent::default()
        };
        for rule in &self.rules.fields {
            let value = self.read_field(item, rule);
            if value.is_none() && rule.required {
                debug!(source = self.source, field = ?rule.field, "listing missing required field");
                return None;
            }
            let slot = match rule.field {
                Field::Title => {
                    raw.title = value.unwrap_or_default();
                    continue;
                }
                Field::Description => &mut raw.description,
                Field::Date => &mut raw.date,
                Field::Time => &mut raw.time,
                Field::Location => &mut raw.location,
                Field::Price => &mut raw.price,
                Field::ImageUrl => &mut raw.image_url,
                Field::SourceUrl => &mut raw.source_url,
            };
            *slot = value;
        }
        Some(raw)
    }
}

impl<'a> Iterator for Extraction<'a> {
    type Item = RawEvent;

    fn next(&mut self) -> Option<RawEvent> {
        loop {
            let item = self.items.next()?;
            match self.extract_item(item) {
                Some(raw) => return Some(raw),
                None => self.dropped += 1,
            }
        }
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{EVENTBRITE_SYDNEY, TIMEOUT_SYDNEY};
    use crate::registry::SourceRegistry;

    const EVENTBRITE_PAGE: &str = r#"
        <html><body>
          <div data-testid="event-card">
            <a href="/e/harbour-lights-123"><h2>  Harbour   Lights </h2></a>
            <time>Sat, May 4, 7:00 PM</time>
            <p>Fireworks over the bridge</p>
            <span data-testid="venue-name">Circular Quay</span>
            <span data-testid="price-range">From $25.00</span>
            <img src="https://img.example.com/lights.jpg">
          </div>
          <div data-testid="event-card">
            <a href="/e/no-title"></a>
            <time>Sun, May 5</time>
          </div>
          <div class="eds-event-card">
            <div class="eds-event-card__formatted-name">Jazz on the Wharf</div>
          </div>
        </body></html>
    "#;

    #[test]
    fn test_extracts_eventbrite_cards() {
        let registry = SourceRegistry::builtin().unwrap();
        let source = registry.get(EVENTBRITE_SYDNEY).unwrap();
        let doc = Html::parse_document(EVENTBRITE_PAGE);

        let mut extraction = extract(
            &doc,
            &source.rules,
            source.name(),
            "https://www.eventbrite.com.au/d/australia--sydney/all-events/",
        );
        let events: Vec<_> = extraction.by_ref().collect();
        assert_eq!(extraction.dropped(), 1);
        assert_eq!(events.len(), 2);

        let first = &events[0];
        assert_eq!(first.source, EVENTBRITE_SYDNEY);
        assert_eq!(first.title, "Harbour Lights");
        assert_eq!(first.date.as_deref(), Some("Sat, May 4, 7:00 PM"));
        assert_eq!(first.description.as_deref(), Some("Fireworks over the bridge"));
        assert_eq!(first.location.as_deref(), Some("Circular Quay"));
        assert_eq!(first.price.as_deref(), Some("From $25.00"));
        assert_eq!(
            first.source_url.as_deref(),
            Some("https://www.eventbrite.com.au/e/harbour-lights-123")
        );
        assert_eq!(first.image_url.as_deref(), Some("https://img.example.com/lights.jpg"));

        let second = &events[1];
        assert_eq!(second.title, "Jazz on the Wharf");
        assert_eq!(second.date, None);
        assert_eq!(second.source_url, None);
    }

    #[test]
    fn test_candidates_tried_in_order() {
        let registry = SourceRegistry::builtin().unwrap();
        let source = registry.get(TIMEOUT_SYDNEY).unwrap();
        let doc = Html::parse_document(
            r#"<div class="card__content">
                 <h3 class="article-card__title">Second choice</h3>
                 <h3 class="card__title">First choice</h3>
               </div>"#,
        );
        let events: Vec<_> = extract(&doc, &source.rules, source.name(), "not a url").collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "First choice");
    }

    #[test]
    fn test_untitled_listing_never_extracted() {
        let registry = SourceRegistry::builtin().unwrap();
        let source = registry.get(TIMEOUT_SYDNEY).unwrap();
        let doc = Html::parse_document(
            r#"<div class="article-card">
                 <span class="card__title">   </span>
                 <span class="card__date">1 May 2024</span>
                 <span class="card__desc">Everything but a title</span>
                 <a href="https://example.com/x">more</a>
               </div>"#,
        );
        let mut extraction = extract(&doc, &source.rules, source.name(), "https://example.com");
        assert!(extraction.next().is_none());
        assert_eq!(extraction.dropped(), 1);
    }
}
