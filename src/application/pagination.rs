//! Tolerant page-number pagination.
//!
//! Feeds are sliced into fixed-size pages addressed by a 1-based page
//! number. Requests never fail on a bad page: garbage parses to page 1 and
//! overshoot clamps to the last page. An empty feed still has a well-defined
//! current page (page 1 of 1).

/// A 1-based page number as requested by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageNumber(u32);

impl PageNumber {
    pub fn first() -> Self {
        Self(1)
    }

    /// Parse a raw query value. Missing, non-numeric, or sub-1 input is
    /// treated as page 1.
    pub fn parse(raw: Option<&str>) -> Self {
        let number = raw
            .map(str::trim)
            .and_then(|value| value.parse::<u32>().ok())
            .filter(|value| *value >= 1)
            .unwrap_or(1);
        Self(number)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl Default for PageNumber {
    fn default() -> Self {
        Self::first()
    }
}

/// The resolved slice a repository query should fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub number: u32,
    pub total_pages: u32,
    pub total_items: u64,
    pub offset: u64,
    pub limit: u32,
}

impl PageWindow {
    pub fn has_next(&self) -> bool {
        self.number < self.total_pages
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Paginator {
    page_size: u32,
}

impl Paginator {
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Total pages for `total_items` entities: `max(1, ceil(N / P))`.
    pub fn total_pages(&self, total_items: u64) -> u32 {
        let size = u64::from(self.page_size);
        let pages = total_items.div_ceil(size).max(1);
        u32::try_from(pages).unwrap_or(u32::MAX)
    }

    /// Resolve a requested page against the current total, clamping past-end
    /// requests to the last page.
    pub fn locate(&self, total_items: u64, requested: PageNumber) -> PageWindow {
        let total_pages = self.total_pages(total_items);
        let number = requested.get().min(total_pages);
        let offset = u64::from(number - 1) * u64::from(self.page_size);

        PageWindow {
            number,
            total_pages,
            total_items,
            offset,
            limit: self.page_size,
        }
    }
}

/// One page of entities together with its position metadata.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: u32,
    pub total_pages: u32,
    pub total_items: u64,
    pub has_next: bool,
    pub has_previous: bool,
}

impl<T> Page<T> {
    pub fn assemble(window: PageWindow, items: Vec<T>) -> Self {
        Self {
            has_next: window.has_next(),
            has_previous: window.has_previous(),
            number: window.number,
            total_pages: window.total_pages,
            total_items: window.total_items,
            items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_plain_numbers() {
        assert_eq!(PageNumber::parse(Some("3")).get(), 3);
        assert_eq!(PageNumber::parse(Some(" 12 ")).get(), 12);
    }

    #[test]
    fn parse_falls_back_to_first_page() {
        assert_eq!(PageNumber::parse(None).get(), 1);
        assert_eq!(PageNumber::parse(Some("")).get(), 1);
        assert_eq!(PageNumber::parse(Some("abc")).get(), 1);
        assert_eq!(PageNumber::parse(Some("0")).get(), 1);
        assert_eq!(PageNumber::parse(Some("-2")).get(), 1);
        assert_eq!(PageNumber::parse(Some("2.5")).get(), 1);
    }

    #[test]
    fn total_pages_is_ceiling_with_floor_of_one() {
        let paginator = Paginator::new(10);
        assert_eq!(paginator.total_pages(0), 1);
        assert_eq!(paginator.total_pages(1), 1);
        assert_eq!(paginator.total_pages(10), 1);
        assert_eq!(paginator.total_pages(11), 2);
        assert_eq!(paginator.total_pages(95), 10);
    }

    #[test]
    fn locate_clamps_overshoot_to_last_page() {
        let paginator = Paginator::new(10);
        let window = paginator.locate(25, PageNumber::parse(Some("99")));
        assert_eq!(window.number, 3);
        assert_eq!(window.total_pages, 3);
        assert_eq!(window.offset, 20);
        assert!(!window.has_next());
        assert!(window.has_previous());
    }

    #[test]
    fn locate_keeps_requests_inside_range() {
        let paginator = Paginator::new(10);
        let window = paginator.locate(25, PageNumber::parse(Some("2")));
        assert_eq!(window.number, 2);
        assert_eq!(window.offset, 10);
        assert!(window.has_next());
        assert!(window.has_previous());
    }

    #[test]
    fn empty_feed_has_a_single_empty_page() {
        let paginator = Paginator::new(10);
        let window = paginator.locate(0, PageNumber::parse(Some("4")));
        assert_eq!(window.number, 1);
        assert_eq!(window.total_pages, 1);
        assert_eq!(window.offset, 0);
        assert!(!window.has_next());
        assert!(!window.has_previous());

        let page: Page<()> = Page::assemble(window, Vec::new());
        assert!(page.items.is_empty());
        assert_eq!(page.number, 1);
        assert_eq!(page.total_pages, 1);
    }

    #[test]
    fn page_size_floor_is_one() {
        let paginator = Paginator::new(0);
        assert_eq!(paginator.page_size(), 1);
        assert_eq!(paginator.total_pages(3), 3);
    }
}
