//! HTML rendering of post listings.
//!
//! Templates are compiled in with [maud](https://maud.lambda.xyz/), so
//! there is nothing to load at start-up and all post text is escaped.

use anyhow::Result;
use maud::{html, Markup, DOCTYPE};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::model::Post;
use crate::pagination::Navigation;

/// Turns a page of posts into a complete document.
pub trait Renderer: Send + Sync {
    fn render(&self, posts: &[Post], nav: Navigation) -> Result<String>;
}

const PAGE_CSS: &str = r#"
body{font-family:-apple-system,BlinkMacSystemFont,"Segoe UI",Roboto,sans-serif;max-width:640px;margin:0 auto;padding:1.5rem 1rem;line-height:1.6;color:#111;background:#fafafa}
article{padding:1rem 0;border-bottom:1px solid #e4e4e4}
.body{white-space:pre-wrap;word-break:break-word}
.media img{max-width:100%;height:auto;display:block;margin:.5rem 0;border-radius:6px}
time{color:#888;font-size:.85rem}
nav{display:flex;justify-content:space-between;padding:1rem 0}
.empty{color:#888}
"#;

#[derive(Clone)]
pub struct HtmlRenderer {
    title: String,
}

impl HtmlRenderer {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }
}

impl Default for HtmlRenderer {
    fn default() -> Self {
        Self::new("posts")
    }
}

fn timestamp(created_at: i64) -> Result<String> {
    Ok(OffsetDateTime::from_unix_timestamp(created_at)?.format(&Rfc3339)?)
}

fn post_card(post: &Post) -> Result<Markup> {
    let when = timestamp(post.created_at)?;
    Ok(html! {
        article id=(format!("post-{}", post.id)) {
            @if !post.body.is_empty() {
                p class="body" { (post.body) }
            }
            @if !post.media.is_empty() {
                div class="media" {
                    @for url in &post.media {
                        a href=(url.as_str()) {
                            img src=(url.as_str()) loading="lazy" alt="";
                        }
                    }
                }
            }
            time datetime=(when) { (when) }
        }
    })
}

fn navigation(nav: Navigation) -> Markup {
    html! {
        nav {
            @if nav.prev_page >= 0 {
                a rel="prev" href=(format!("/posts?page={}", nav.prev_page)) { "newer" }
            } @else {
                span {}
            }
            @if nav.next_page >= 0 {
                a rel="next" href=(format!("/posts?page={}", nav.next_page)) { "older" }
            }
        }
    }
}

impl Renderer for HtmlRenderer {
    fn render(&self, posts: &[Post], nav: Navigation) -> Result<String> {
        let cards = posts.iter().map(post_card).collect::<Result<Vec<_>>>()?;
        let page = html! {
            (DOCTYPE)
            html lang="en" {
                head {
                    meta charset="utf-8";
                    meta name="viewport" content="width=device-width, initial-scale=1";
                    title { (self.title) }
                    style { (maud::PreEscaped(PAGE_CSS)) }
                }
                body {
                    main {
                        @if cards.is_empty() {
                            p class="empty" { "nothing here yet" }
                        }
                        @for card in cards {
                            (card)
                        }
                    }
                    (navigation(nav))
                }
            }
        };
        Ok(page.into_string())
    }
}
