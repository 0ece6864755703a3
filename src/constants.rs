/// Source name constants to keep the registry, CLI and tests in agreement
pub const TIMEOUT_SYDNEY: &str = "timeout_sydney";
pub const EVENTBRITE_SYDNEY: &str = "eventbrite_sydney";

// Field defaults applied by the normalizer
pub const DEFAULT_TIME: &str = "Check website";
pub const DEFAULT_LOCATION: &str = "Sydney";
pub const DEFAULT_PRICE: &str = "Price varies";

// Page loading
pub const DEFAULT_NAVIGATION_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_SELECTOR_TIMEOUT_MS: u64 = 10_000;
pub const SELECTOR_POLL_INTERVAL_MS: u64 = 250;
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";
pub const CHROME_ARGS: [&str; 3] = [
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-web-security",
];

// Server and scheduling
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_ALLOWED_ORIGIN: &str = "http://localhost:5173";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://events.db";
pub const DEFAULT_SCRAPE_INTERVAL_HOURS: u64 = 6;

/// Built-in source definitions, one JSON document per source
pub const BUILTIN_SOURCES: [(&str, &str); 2] = [
    (
        TIMEOUT_SYDNEY,
        include_str!("../registry/sources/timeout_sydney.json"),
    ),
    (
        EVENTBRITE_SYDNEY,
        include_str!("../registry/sources/eventbrite_sydney.json"),
    ),
];
