//! Seed data written on first run.
//!
//! The built-in catalog is used unless `catalog_path` points at a TOML file of
//! `[[books]]` entries. The default administrator is injected whenever a user
//! collection has no admin.

use crate::core::normalize::{ProductDraft, UserDraft};
use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Email of the administrator injected when no admin exists.
pub const DEFAULT_ADMIN_EMAIL: &str = "admin@library.local";
/// Demo password of the injected administrator.
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin123";
/// Stable id of the injected administrator.
pub const DEFAULT_ADMIN_ID: &str = "u-admin";
pub const DEFAULT_ADMIN_NAME: &str = "Administrator";
/// Password given to user records that arrive without one.
pub const PLACEHOLDER_PASSWORD: &str = "changeme";

/// Structure of a catalog seed file
#[derive(Debug, Deserialize)]
pub struct CatalogFile {
    pub books: Vec<ProductDraft>,
}

/// Loads seed books from a TOML file.
///
/// # Errors
/// Returns an error if the file cannot be read or parsed.
pub fn load_catalog<P: AsRef<Path>>(path: P) -> Result<Vec<ProductDraft>> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!("Failed to read catalog file: {e}"),
    })?;

    let file: CatalogFile = toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse catalog file: {e}"),
    })?;
    Ok(file.books)
}

/// The administrator record injected by the single-admin rule, before
/// normalisation fills in timestamps.
#[must_use]
pub fn default_admin() -> UserDraft {
    UserDraft {
        id: Some(DEFAULT_ADMIN_ID.to_string()),
        name: DEFAULT_ADMIN_NAME.to_string(),
        email: DEFAULT_ADMIN_EMAIL.to_string(),
        password: Some(DEFAULT_ADMIN_PASSWORD.to_string()),
        role: Some("admin".to_string()),
        status: Some("active".to_string()),
        created_at: None,
        updated_at: None,
    }
}

#[allow(clippy::too_many_arguments)]
fn book(
    id: &str,
    title: &str,
    author: &str,
    genre: &str,
    price: f64,
    format: &str,
    pages: i32,
    isbn: &str,
    description: &str,
    image: u8,
) -> ProductDraft {
    ProductDraft {
        id: id.to_string(),
        title: title.to_string(),
        author: author.to_string(),
        genre: genre.to_string(),
        price,
        cover: format!("assets/images/book-{image}.png"),
        format: format.to_string(),
        pages,
        isbn: isbn.to_string(),
        description: description.to_string(),
        ..ProductDraft::default()
    }
}

/// The built-in catalog.
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn default_catalog() -> Vec<ProductDraft> {
    vec![
        book(
            "the-great-library",
            "The Great Library",
            "Rachel Caine",
            "fiction",
            14.99,
            "Paperback",
            320,
            "978-1-2345-6789-0",
            "In a world where knowledge is the ultimate power, the Great Library controls all \
             written words. A story of rebellion, forbidden books, and the thirst for truth.",
            1,
        ),
        book(
            "designing-uis",
            "Designing UIs",
            "Dole & Gordon",
            "design",
            24.0,
            "Hardcover",
            280,
            "978-1-1111-2222-3",
            "Practical design patterns for creating better, more accessible user interfaces \
             with timeless usability principles.",
            2,
        ),
        book(
            "data-stories",
            "Data Stories",
            "Cole N. Knaflic",
            "data",
            18.5,
            "Paperback",
            256,
            "978-9-8765-4321-0",
            "Learn how to make data speak through storytelling and narrative visualization \
             techniques that engage and inform.",
            3,
        ),
        book(
            "clean-code",
            "Clean Code",
            "Robert C. Martin",
            "programming",
            29.99,
            "Paperback",
            464,
            "978-0-13-235088-4",
            "Timeless practices for writing clean, efficient, and maintainable code from one \
             of the masters of software engineering.",
            4,
        ),
        book(
            "the-algorithmic-mind",
            "The Algorithmic Mind",
            "Thomas Smith",
            "philosophy",
            17.0,
            "Paperback",
            300,
            "978-0-12-345678-9",
            "Explore how algorithms shape human thought and decision-making in a deeply \
             philosophical journey.",
            5,
        ),
        book(
            "minimal-design",
            "Minimal Design",
            "Lisa Frank",
            "design",
            21.0,
            "Hardcover",
            240,
            "978-3-16-148410-0",
            "Less, but better. Lessons in design thinking and the art of simplicity.",
            6,
        ),
    ]
}
