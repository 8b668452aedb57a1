//! Page index handling for post listings.

use crate::error::PostError;
use crate::model::Post;
use crate::store::PostStore;

/// `next_page` value meaning there is nothing older to show.
pub const NO_NEXT_PAGE: i64 = -1;

/// Query parameter selecting the page.
pub const PAGE_PARAM: &str = "page";

/// Pick the requested page out of a raw query string.
///
/// Anything that is not a non-negative 64-bit integer, including a missing
/// parameter or surrounding whitespace, selects page 0. Pages past the end
/// are kept as asked and simply render empty.
pub fn page_from_query(query: Option<&str>) -> u64 {
    let Some(query) = query else {
        return 0;
    };
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == PAGE_PARAM)
        .and_then(|(_, v)| v.parse::<i64>().ok())
        .and_then(|n| u64::try_from(n).ok())
        .unwrap_or(0)
}

/// The slice of the post sequence a page covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub offset: u64,
    pub limit: u64,
}

impl PageWindow {
    pub fn new(page: u64, page_size: u32) -> Self {
        Self {
            offset: page.saturating_mul(u64::from(page_size)),
            limit: u64::from(page_size),
        }
    }
}

/// Links to neighbouring pages.
///
/// The two fields are independent: `prev_page` is plain `page - 1` and is
/// `-1` on the first page, while `next_page` uses [`NO_NEXT_PAGE`] when
/// the store reported nothing further.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Navigation {
    pub next_page: i64,
    pub prev_page: i64,
}

impl Navigation {
    pub fn new(page: u64, more: bool) -> Self {
        let page = i64::try_from(page).unwrap_or(i64::MAX);
        Self {
            next_page: if more { page.saturating_add(1) } else { NO_NEXT_PAGE },
            prev_page: page - 1,
        }
    }
}

/// A page of posts ready for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub page: u64,
    pub posts: Vec<Post>,
    pub nav: Navigation,
}

/// Read one page from the store.
pub async fn load(store: &dyn PostStore, page: u64, page_size: u32) -> Result<Listing, PostError> {
    let slice = store
        .get_page(PageWindow::new(page, page_size))
        .await
        .map_err(|e| PostError::Upstream(e.context("failed to get posts from store")))?;
    Ok(Listing {
        page,
        nav: Navigation::new(page, slice.more),
        posts: slice.posts,
    })
}
