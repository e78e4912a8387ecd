//! Catalog queries over the active products view.
//!
//! Everything here is pure: callers pass the products they got from
//! [`crate::core::PersistenceCoordinator::active_products`].

use crate::core::normalize::genre_key;
use crate::entities::ProductModel;
use std::collections::BTreeSet;

/// Step of the price slider.
const PRICE_STEP: f64 = 5.0;
/// Slider maximum when there is nothing to price.
const EMPTY_PRICE_CEILING: f64 = 50.0;

/// Catalog filter as entered by the shopper. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogFilter {
    /// Case-insensitive title substring
    pub query: String,
    /// Genre key; compared after trimming and lower-casing
    pub genre: Option<String>,
    /// Inclusive upper bound on the list price
    pub max_price: Option<f64>,
}

impl CatalogFilter {
    #[must_use]
    pub fn matches(&self, product: &ProductModel) -> bool {
        let query = self.query.trim().to_lowercase();
        if !query.is_empty() && !product.title.to_lowercase().contains(&query) {
            return false;
        }

        if let Some(genre) = self.genre.as_deref().map(genre_key) {
            if !genre.is_empty() && genre_key(&product.genre) != genre {
                return false;
            }
        }

        self.max_price.is_none_or(|max| product.price <= max)
    }
}

/// Products matching `filter`, in catalog order.
#[must_use]
pub fn filter<'a>(products: &'a [ProductModel], filter: &CatalogFilter) -> Vec<&'a ProductModel> {
    products.iter().filter(|p| filter.matches(p)).collect()
}

/// Sorted, distinct genre keys.
#[must_use]
pub fn genres(products: &[ProductModel]) -> Vec<String> {
    products
        .iter()
        .map(|p| genre_key(&p.genre))
        .filter(|g| !g.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Display label for a genre key: `"data_science"` -> `"Data Science"`.
#[must_use]
pub fn genre_label(key: &str) -> String {
    let words: Vec<String> = genre_key(key)
        .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect()
            })
        })
        .collect();

    if words.is_empty() {
        "Other".to_string()
    } else {
        words.join(" ")
    }
}

/// Upper bound of the price slider: the highest list price rounded up to a
/// whole multiple of 5, or 50 for an empty catalog.
#[must_use]
pub fn price_ceiling(products: &[ProductModel]) -> f64 {
    let max = products
        .iter()
        .map(|p| p.price)
        .filter(|price| price.is_finite() && *price >= 0.0)
        .fold(0.0_f64, f64::max);

    let ceiling = (max.ceil() / PRICE_STEP).ceil() * PRICE_STEP;
    if ceiling > 0.0 {
        ceiling
    } else {
        EMPTY_PRICE_CEILING
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::test_utils::sample_product;

    fn catalog() -> Vec<ProductModel> {
        let mut library = sample_product("the-great-library", 14.99);
        library.title = "The Great Library".to_string();
        library.genre = "fiction".to_string();
        let mut code = sample_product("clean-code", 29.99);
        code.title = "Clean Code".to_string();
        code.genre = "programming".to_string();
        let mut data = sample_product("data-stories", 18.5);
        data.title = "Data Stories".to_string();
        data.genre = "data_science".to_string();
        vec![library, code, data]
    }

    #[test]
    fn test_filter_combines_conditions() {
        let products = catalog();

        let by_title = CatalogFilter {
            query: "  CODE ".to_string(),
            ..CatalogFilter::default()
        };
        assert_eq!(filter(&products, &by_title).len(), 1);

        let cheap_fiction = CatalogFilter {
            genre: Some("Fiction".to_string()),
            max_price: Some(15.0),
            ..CatalogFilter::default()
        };
        let found = filter(&products, &cheap_fiction);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "the-great-library");

        let too_cheap = CatalogFilter {
            max_price: Some(10.0),
            ..CatalogFilter::default()
        };
        assert!(filter(&products, &too_cheap).is_empty());
        assert_eq!(filter(&products, &CatalogFilter::default()).len(), 3);
    }

    #[test]
    fn test_genres_and_labels() {
        assert_eq!(
            genres(&catalog()),
            vec!["data_science", "fiction", "programming"]
        );
        assert_eq!(genre_label("data_science"), "Data Science");
        assert_eq!(genre_label(" programming "), "Programming");
        assert_eq!(genre_label(""), "Other");
    }

    #[test]
    fn test_price_ceiling() {
        assert_eq!(price_ceiling(&catalog()), 30.0);
        assert_eq!(price_ceiling(&[]), 50.0);

        let mut exact = catalog();
        exact.truncate(1);
        exact[0].price = 20.0;
        assert_eq!(price_ceiling(&exact), 20.0);
    }
}
