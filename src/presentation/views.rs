use askama::{Error as AskamaError, Template};
use axum::{http::StatusCode, response::Html};
use chirp_api_types::procedures::posts::{GetAll, GetPostsByUserId, GetPostsByUserIdInput};
use chirp_api_types::procedures::profile::{GetUserByUsername, GetUserByUsernameInput};
use chirp_api_types::{Author, PostWithAuthor};
use serde::Serialize;
use thiserror::Error;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::application::error::HttpError;
use crate::application::pages::{FeedProps, GeneratedPage, ProfileNotFound, ProfileProps};
use crate::cache::{QueryState, payload_script};
use crate::domain::slug::profile_slug;

const SITE_NAME: &str = "Chirp";
const FEED_EMPTY: &str = "No posts yet";
const PROFILE_EMPTY: &str = "User has not posted";

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub struct LayoutView {
    pub title: String,
    /// Pre-escaped `<script>` element carrying the page payload, if any.
    pub payload_script: String,
}

impl LayoutView {
    fn new<P: Serialize>(title: String, payload: Option<&P>) -> Result<Self, HttpError> {
        let payload_script = match payload {
            Some(payload) => payload_script(payload).map_err(|err| {
                HttpError::from_error(
                    "presentation::views::LayoutView",
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Template rendering failed",
                    &err,
                )
            })?,
            None => String::new(),
        };
        Ok(Self {
            title,
            payload_script,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostCardView {
    pub id: String,
    pub username: String,
    pub profile_href: String,
    pub profile_image_url: String,
    pub content: String,
    pub iso_time: String,
    pub relative_time: String,
}

impl PostCardView {
    pub fn new(item: &PostWithAuthor, now: OffsetDateTime) -> Self {
        Self {
            id: item.post.id.to_string(),
            username: item.author.username.clone(),
            profile_href: format!("/{}", profile_slug(&item.author.username)),
            profile_image_url: item.author.profile_image_url.clone(),
            content: item.post.content.clone(),
            iso_time: item.post.created_at.format(&Rfc3339).unwrap_or_default(),
            relative_time: relative_time(item.post.created_at, now),
        }
    }
}

/// Render state of one post list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostListView {
    pub loading: bool,
    pub failed: bool,
    pub empty_message: &'static str,
    pub posts: Vec<PostCardView>,
}

impl PostListView {
    pub fn from_state(
        state: QueryState<Vec<PostWithAuthor>>,
        empty_message: &'static str,
        now: OffsetDateTime,
    ) -> Self {
        let mut view = Self {
            loading: false,
            failed: false,
            empty_message,
            posts: Vec::new(),
        };
        match state {
            QueryState::Loading => view.loading = true,
            QueryState::Error(_) => view.failed = true,
            QueryState::Success { data, .. } => {
                view.posts = data.iter().map(|item| PostCardView::new(item, now)).collect();
            }
        }
        view
    }

    /// Server render of a prefetched list. A failed prefetch is left out of
    /// the snapshot, so the client starts that list loading and fetches it.
    pub fn prefetched(
        state: QueryState<Vec<PostWithAuthor>>,
        empty_message: &'static str,
        now: OffsetDateTime,
    ) -> Self {
        let state = match state {
            QueryState::Error(_) => QueryState::Loading,
            other => other,
        };
        Self::from_state(state, empty_message, now)
    }
}

pub struct ViewerView {
    pub username: String,
    pub profile_image_url: String,
}

impl From<&Author> for ViewerView {
    fn from(author: &Author) -> Self {
        Self {
            username: author.username.clone(),
            profile_image_url: author.profile_image_url.clone(),
        }
    }
}

#[derive(Template)]
#[template(path = "feed.html")]
pub struct FeedTemplate {
    pub layout: LayoutView,
    pub composer: Option<ViewerView>,
    pub feed: PostListView,
}

#[derive(Template)]
#[template(path = "profile.html")]
pub struct ProfileTemplate {
    pub layout: LayoutView,
    pub profile: ViewerView,
    pub feed: PostListView,
}

#[derive(Template)]
#[template(path = "not_found.html")]
pub struct NotFoundTemplate {
    pub layout: LayoutView,
    pub message: String,
}

/// Render the feed from the request cache, as the client will first see it.
pub fn render_feed_page(
    page: &GeneratedPage<FeedProps>,
    now: OffsetDateTime,
) -> Result<Html<String>, HttpError> {
    let client = page.prefetch.client();
    let template = FeedTemplate {
        layout: LayoutView::new(SITE_NAME.to_string(), Some(&page.payload))?,
        composer: page.payload.props.viewer.as_ref().map(ViewerView::from),
        feed: PostListView::prefetched(client.read::<GetAll>(&()), FEED_EMPTY, now),
    };
    render_template(template)
}

pub fn render_profile_page(
    page: &GeneratedPage<ProfileProps>,
    now: OffsetDateTime,
) -> Result<Html<String>, HttpError> {
    let client = page.prefetch.client();
    let username = page.payload.props.username.clone();
    let author = client
        .read::<GetUserByUsername>(&GetUserByUsernameInput {
            username: username.clone(),
        })
        .into_result()
        .map_err(|err| {
            HttpError::from_error(
                "presentation::views::render_profile_page",
                StatusCode::INTERNAL_SERVER_ERROR,
                "Profile could not be rendered",
                &err,
            )
        })?;
    let posts = client.read::<GetPostsByUserId>(&GetPostsByUserIdInput {
        user_id: author.id.clone(),
    });

    let template = ProfileTemplate {
        layout: LayoutView::new(
            format!("{} · {SITE_NAME}", profile_slug(&username)),
            Some(&page.payload),
        )?,
        profile: ViewerView::from(&author),
        feed: PostListView::prefetched(posts, PROFILE_EMPTY, now),
    };
    render_template(template)
}

pub fn render_not_found(reason: &ProfileNotFound) -> Result<Html<String>, HttpError> {
    let message = match reason {
        ProfileNotFound::UnknownUser { username } => {
            format!("{} does not exist.", profile_slug(username))
        }
        ProfileNotFound::BadSlug(_) => "The page you requested does not exist.".to_string(),
    };
    render_template(NotFoundTemplate {
        layout: LayoutView::new::<()>(format!("Not found · {SITE_NAME}"), None)?,
        message,
    })
}

/// Coarse human-readable distance from `then` to `now`.
pub fn relative_time(then: OffsetDateTime, now: OffsetDateTime) -> String {
    let seconds = (now - then).whole_seconds();
    if seconds < 0 {
        return "just now".to_string();
    }

    let minutes = (seconds as f64 / 60.0).round() as i64;
    let hours = (seconds as f64 / 3_600.0).round() as i64;
    let days = (seconds as f64 / 86_400.0).round() as i64;
    let months = (days as f64 / 30.4).round() as i64;

    match seconds {
        s if s < 45 => "a few seconds ago".to_string(),
        s if s < 90 => "a minute ago".to_string(),
        s if s < 45 * 60 => format!("{minutes} minutes ago"),
        s if s < 90 * 60 => "an hour ago".to_string(),
        s if s < 22 * 3_600 => format!("{hours} hours ago"),
        s if s < 36 * 3_600 => "a day ago".to_string(),
        _ if days < 26 => format!("{days} days ago"),
        _ if days < 46 => "a month ago".to_string(),
        _ if days < 320 => format!("{months} months ago"),
        _ if days < 548 => "a year ago".to_string(),
        _ => format!("{} years ago", (days as f64 / 365.0).round() as i64),
    }
}
