use serde::Serialize;

/// Destinations shown per index page.
pub const PAGE_SIZE: usize = 6;

/// One page of a larger list, plus what a template needs to link its neighbours.
#[derive(Clone, Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: usize,
    pub num_pages: usize,
    pub count: usize,
    pub has_previous: bool,
    pub has_next: bool,
    pub previous_page_number: Option<usize>,
    pub next_page_number: Option<usize>,
    pub page_range: Vec<usize>,
}

fn is_integer(s: &str) -> bool {
    let digits = s.strip_prefix(['+', '-']).unwrap_or(s);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Slice `items` into the requested page.
///
/// A missing or non-integer page yields the first page; an integer outside
/// `1..=num_pages` yields the last page. An empty list still has one (empty) page.
pub fn paginate<T: Clone>(items: &[T], page_size: usize, requested_page: Option<&str>) -> Page<T> {
    let page_size = page_size.max(1);
    let count = items.len();
    let num_pages = count.div_ceil(page_size).max(1);

    let number = match requested_page.map(str::trim) {
        Some(page) => match page.parse::<i64>() {
            Ok(n) if n >= 1 && (n as usize) <= num_pages => n as usize,
            Ok(_) => num_pages,
            // still an integer, just too wide for i64
            Err(_) if is_integer(page) => num_pages,
            Err(_) => 1,
        },
        None => 1,
    };

    let start = (number - 1) * page_size;
    let end = (start + page_size).min(count);
    Page {
        items: items[start.min(count)..end].to_vec(),
        number,
        num_pages,
        count,
        has_previous: number > 1,
        has_next: number < num_pages,
        previous_page_number: (number > 1).then(|| number - 1),
        next_page_number: (number < num_pages).then(|| number + 1),
        page_range: (1..=num_pages).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thirteen() -> Vec<u32> {
        (1..=13).collect()
    }

    #[test]
    fn test_first_page() {
        let page = paginate(&thirteen(), PAGE_SIZE, Some("1"));
        assert_eq!(page.items, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(page.num_pages, 3);
        assert!(!page.has_previous);
        assert_eq!(page.next_page_number, Some(2));
    }

    #[test]
    fn test_last_page_partial() {
        let page = paginate(&thirteen(), PAGE_SIZE, Some("3"));
        assert_eq!(page.items, vec![13]);
        assert!(!page.has_next);
        assert_eq!(page.previous_page_number, Some(2));
    }

    #[test]
    fn test_out_of_range_is_last_page() {
        let items = thirteen();
        assert_eq!(paginate(&items, PAGE_SIZE, Some("4")).items, paginate(&items, PAGE_SIZE, Some("3")).items);
        assert_eq!(paginate(&items, PAGE_SIZE, Some("999")).number, 3);
        assert_eq!(paginate(&items, PAGE_SIZE, Some("0")).number, 3);
        assert_eq!(paginate(&items, PAGE_SIZE, Some("-2")).number, 3);
    }

    #[test]
    fn test_overflowing_integer_is_last_page() {
        let items = thirteen();
        assert_eq!(paginate(&items, PAGE_SIZE, Some("99999999999999999999")).number, 3);
        assert_eq!(paginate(&items, PAGE_SIZE, Some("-99999999999999999999")).number, 3);
        assert_eq!(paginate(&items, PAGE_SIZE, Some(" +2 ")).number, 2);
        assert_eq!(paginate(&items, PAGE_SIZE, Some("-")).number, 1);
    }

    #[test]
    fn test_non_integer_is_first_page() {
        let items = thirteen();
        assert_eq!(paginate(&items, PAGE_SIZE, Some("abc")).items, paginate(&items, PAGE_SIZE, Some("1")).items);
        assert_eq!(paginate(&items, PAGE_SIZE, Some("")).number, 1);
        assert_eq!(paginate(&items, PAGE_SIZE, Some("2.5")).number, 1);
        assert_eq!(paginate(&items, PAGE_SIZE, None).number, 1);
    }

    #[test]
    fn test_empty() {
        let page = paginate::<u32>(&[], PAGE_SIZE, Some("5"));
        assert!(page.items.is_empty());
        assert_eq!(page.number, 1);
        assert_eq!(page.num_pages, 1);
        assert_eq!(page.page_range, vec![1]);
    }

    #[test]
    fn test_exact_multiple() {
        let items: Vec<u32> = (1..=12).collect();
        let page = paginate(&items, PAGE_SIZE, Some("2"));
        assert_eq!(page.items, vec![7, 8, 9, 10, 11, 12]);
        assert_eq!(page.num_pages, 2);
    }
}
