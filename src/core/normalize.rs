//! Record normalisation - the single place where loose records become total ones.
//!
//! Records arrive from the flat-storage blob, from patches handed to
//! `save()`, from seed files and from cross-tab refreshes. Each of those
//! boundaries funnels through [`normalize_product`] / [`normalize_user`], so no
//! other code ever sees a partially-filled record. Normalising an already
//! normalised record is the identity.

use crate::config::seed::{self, DEFAULT_ADMIN_EMAIL, PLACEHOLDER_PASSWORD};
use crate::entities::{ProductModel, ProductStatus, UserModel, UserRole, UserStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A product record whose optional fields have not been defaulted yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProductDraft {
    pub id: String,
    pub title: String,
    pub author: String,
    pub genre: String,
    pub price: f64,
    pub cover: String,
    pub format: String,
    pub pages: i32,
    pub isbn: String,
    pub description: String,
    pub status: Option<String>,
    pub bf_deal: bool,
    pub bf_discount: f64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<ProductModel> for ProductDraft {
    fn from(p: ProductModel) -> Self {
        Self {
            id: p.id,
            title: p.title,
            author: p.author,
            genre: p.genre,
            price: p.price,
            cover: p.cover,
            format: p.format,
            pages: p.pages,
            isbn: p.isbn,
            description: p.description,
            status: Some(status_str(p.status).to_string()),
            bf_deal: p.bf_deal,
            bf_discount: p.bf_discount,
            created_at: Some(p.created_at),
            updated_at: Some(p.updated_at),
        }
    }
}

/// A user record whose optional fields have not been defaulted yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserDraft {
    pub id: Option<String>,
    pub name: String,
    pub email: String,
    pub password: Option<String>,
    pub role: Option<String>,
    pub status: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<UserModel> for UserDraft {
    fn from(u: UserModel) -> Self {
        Self {
            id: Some(u.id),
            name: u.name,
            email: u.email,
            password: Some(u.password),
            role: Some(
                match u.role {
                    UserRole::Admin => "admin",
                    UserRole::User => "user",
                }
                .to_string(),
            ),
            status: Some(
                match u.status {
                    UserStatus::Active => "active",
                    UserStatus::Inactive => "inactive",
                }
                .to_string(),
            ),
            created_at: Some(u.created_at),
            updated_at: Some(u.updated_at),
        }
    }
}

const fn status_str(status: ProductStatus) -> &'static str {
    match status {
        ProductStatus::Active => "active",
        ProductStatus::Inactive => "inactive",
    }
}

fn is_inactive(status: Option<&str>) -> bool {
    status.is_some_and(|s| s.trim().eq_ignore_ascii_case("inactive"))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Lower-cases and trims a genre so it can be compared as a key.
#[must_use]
pub fn genre_key(genre: &str) -> String {
    genre.trim().to_lowercase()
}

/// Turns a title into a url-safe slug (`"Clean Code"` -> `"clean-code"`).
#[must_use]
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for ch in text.trim().chars() {
        if ch.is_alphanumeric() {
            slug.extend(ch.to_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

/// Id given to a user record that has none: derived from the email and the
/// current time. Uniqueness is not checked; last write wins.
#[must_use]
pub fn generate_user_id(email: &str, now: DateTime<Utc>) -> String {
    let local = email.split('@').next().unwrap_or_default();
    let slug = slugify(local);
    if slug.is_empty() {
        format!("u-{}", now.timestamp_millis())
    } else {
        format!("u-{slug}-{}", now.timestamp_millis())
    }
}

/// Fills every missing product field.
#[must_use]
pub fn normalize_product(draft: ProductDraft, now: DateTime<Utc>) -> ProductModel {
    let id = if draft.id.trim().is_empty() {
        slugify(&draft.title)
    } else {
        draft.id.trim().to_string()
    };
    let price = if draft.price.is_finite() {
        draft.price.max(0.0)
    } else {
        0.0
    };
    let bf_discount = if draft.bf_discount.is_finite() {
        draft.bf_discount.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let created_at = draft.created_at.unwrap_or(now);

    ProductModel {
        id,
        title: draft.title.trim().to_string(),
        author: draft.author.trim().to_string(),
        genre: genre_key(&draft.genre),
        price,
        cover: draft.cover,
        format: draft.format,
        pages: draft.pages.max(0),
        isbn: draft.isbn,
        description: draft.description,
        status: if is_inactive(draft.status.as_deref()) {
            ProductStatus::Inactive
        } else {
            ProductStatus::Active
        },
        bf_deal: draft.bf_deal,
        bf_discount,
        created_at,
        updated_at: draft.updated_at.unwrap_or(now),
    }
}

/// Fills every missing user field.
///
/// The role defaults to `admin` only for the default administrator email,
/// everything else becomes `user`. Unknown status strings count as `active`.
#[must_use]
pub fn normalize_user(draft: UserDraft, now: DateTime<Utc>) -> UserModel {
    let email = draft.email.trim().to_string();
    let id = non_blank(draft.id)
        .map(|id| id.trim().to_string())
        .unwrap_or_else(|| generate_user_id(&email, now));
    let role = match draft.role.as_deref().map(str::trim) {
        Some(r) if r.eq_ignore_ascii_case("admin") => UserRole::Admin,
        Some(r) if r.eq_ignore_ascii_case("user") => UserRole::User,
        _ if email.eq_ignore_ascii_case(DEFAULT_ADMIN_EMAIL) => UserRole::Admin,
        _ => UserRole::User,
    };
    let name = match draft.name.trim() {
        "" => email.split('@').next().unwrap_or_default().to_string(),
        name => name.to_string(),
    };

    UserModel {
        id,
        name,
        email,
        password: non_blank(draft.password).unwrap_or_else(|| PLACEHOLDER_PASSWORD.to_string()),
        role,
        status: if is_inactive(draft.status.as_deref()) {
            UserStatus::Inactive
        } else {
            UserStatus::Active
        },
        created_at: draft.created_at.unwrap_or(now),
        updated_at: draft.updated_at.unwrap_or(now),
    }
}

pub fn normalize_products<I>(drafts: I, now: DateTime<Utc>) -> Vec<ProductModel>
where
    I: IntoIterator<Item = ProductDraft>,
{
    drafts
        .into_iter()
        .map(|draft| normalize_product(draft, now))
        .collect()
}

/// Normalises a user collection and enforces the admin rule.
pub fn normalize_users<I>(drafts: I, now: DateTime<Utc>) -> Vec<UserModel>
where
    I: IntoIterator<Item = UserDraft>,
{
    let mut users: Vec<UserModel> = drafts
        .into_iter()
        .map(|draft| normalize_user(draft, now))
        .collect();
    ensure_admin(&mut users, now);
    users
}

/// Guarantees the collection has an administrator.
///
/// If nobody has the admin role, a user registered under the default admin
/// email is promoted; otherwise the default administrator is appended.
/// Returns true when the collection was changed.
pub fn ensure_admin(users: &mut Vec<UserModel>, now: DateTime<Utc>) -> bool {
    if users.iter().any(UserModel::is_admin) {
        return false;
    }

    if let Some(existing) = users.iter_mut().find(|u| u.has_email(DEFAULT_ADMIN_EMAIL)) {
        tracing::warn!(user_id = %existing.id, "No admin present, promoting default admin account");
        existing.role = UserRole::Admin;
        existing.updated_at = now;
    } else {
        tracing::warn!("No admin present, injecting default admin");
        users.push(normalize_user(seed::default_admin(), now));
    }
    true
}
