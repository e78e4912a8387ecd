//! Purchase history: filtering, sorting and totals over a user's orders.

use crate::entities::{OrderItemModel, OrderModel};
use serde::Serialize;
use std::str::FromStr;

/// An order together with its line items.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: OrderModel,
    pub items: Vec<OrderItemModel>,
}

impl OrderWithItems {
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.items
            .iter()
            .map(|item| u64::try_from(item.qty).unwrap_or(0))
            .sum()
    }

    fn search_text(&self) -> String {
        let mut text = self.order.id.to_lowercase();
        for item in &self.items {
            text.push(' ');
            text.push_str(&item.title.to_lowercase());
        }
        text
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderSort {
    #[default]
    Newest,
    Oldest,
    TotalDesc,
    TotalAsc,
}

impl FromStr for OrderSort {
    type Err = std::convert::Infallible;

    /// Unknown values sort newest first.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "oldest" => Self::Oldest,
            "total_desc" => Self::TotalDesc,
            "total_asc" => Self::TotalAsc,
            _ => Self::Newest,
        })
    }
}

/// History page controls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderQuery {
    /// Matched against order id and item titles, case-insensitively
    pub search: String,
    /// `None` or `"all"` keeps every status
    pub status: Option<String>,
    pub sort: OrderSort,
}

impl OrderQuery {
    fn matches(&self, order: &OrderWithItems) -> bool {
        let status_ok = match self.status.as_deref().map(str::trim) {
            None | Some("" | "all") => true,
            Some(status) => order.order.status.as_str().eq_ignore_ascii_case(status),
        };
        let search = self.search.trim().to_lowercase();
        status_ok && (search.is_empty() || order.search_text().contains(&search))
    }

    /// Filters and sorts `orders`.
    #[must_use]
    pub fn apply(&self, orders: &[OrderWithItems]) -> Vec<OrderWithItems> {
        let mut out: Vec<OrderWithItems> = orders
            .iter()
            .filter(|order| self.matches(order))
            .cloned()
            .collect();

        match self.sort {
            OrderSort::Newest => out.sort_by(|a, b| b.order.created_at.cmp(&a.order.created_at)),
            OrderSort::Oldest => out.sort_by(|a, b| a.order.created_at.cmp(&b.order.created_at)),
            OrderSort::TotalDesc => {
                out.sort_by(|a, b| b.order.totals.total.total_cmp(&a.order.totals.total));
            }
            OrderSort::TotalAsc => {
                out.sort_by(|a, b| a.order.totals.total.total_cmp(&b.order.totals.total));
            }
        }
        out
    }
}

/// Summary shown above the history list.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PurchaseStats {
    pub orders: usize,
    pub items: u64,
    pub spent: f64,
}

#[must_use]
pub fn purchase_stats(orders: &[OrderWithItems]) -> PurchaseStats {
    PurchaseStats {
        orders: orders.len(),
        items: orders.iter().map(OrderWithItems::item_count).sum(),
        spent: orders.iter().map(|o| o.order.totals.total).sum(),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::entities::OrderStatus;
    use crate::test_utils::sample_order;
    use chrono::Duration;

    fn history() -> Vec<OrderWithItems> {
        let (mut first, first_items) =
            sample_order("DL-1", Some("u-1"), &[("clean-code", 29.99, 1)]);
        let (mut second, second_items) = sample_order(
            "DL-2",
            Some("u-1"),
            &[("data-stories", 18.5, 2), ("minimal-design", 21.0, 1)],
        );
        second.created_at = first.created_at + Duration::minutes(5);
        second.status = OrderStatus::Refunded;
        first.totals.total = 29.99;
        second.totals.total = 58.0;
        vec![
            OrderWithItems { order: first, items: first_items },
            OrderWithItems { order: second, items: second_items },
        ]
    }

    #[test]
    fn test_sorting() {
        let orders = history();
        let ids = |q: &OrderQuery| -> Vec<String> {
            q.apply(&orders).into_iter().map(|o| o.order.id).collect()
        };

        let newest = OrderQuery::default();
        assert_eq!(ids(&newest), vec!["DL-2", "DL-1"]);
        let oldest = OrderQuery {
            sort: "oldest".parse().unwrap(),
            ..OrderQuery::default()
        };
        assert_eq!(ids(&oldest), vec!["DL-1", "DL-2"]);
        let cheapest = OrderQuery {
            sort: OrderSort::TotalAsc,
            ..OrderQuery::default()
        };
        assert_eq!(ids(&cheapest), vec!["DL-1", "DL-2"]);
    }

    #[test]
    fn test_search_and_status() {
        let orders = history();

        let by_title = OrderQuery {
            search: "Minimal".to_string(),
            ..OrderQuery::default()
        };
        assert_eq!(by_title.apply(&orders).len(), 1);

        let by_id = OrderQuery {
            search: "dl-1".to_string(),
            ..OrderQuery::default()
        };
        assert_eq!(by_id.apply(&orders)[0].order.id, "DL-1");

        let paid = OrderQuery {
            status: Some("PAID".to_string()),
            ..OrderQuery::default()
        };
        assert_eq!(paid.apply(&orders).len(), 1);

        let all = OrderQuery {
            status: Some("all".to_string()),
            ..OrderQuery::default()
        };
        assert_eq!(all.apply(&orders).len(), 2);
    }

    #[test]
    fn test_purchase_stats() {
        let stats = purchase_stats(&history());
        assert_eq!(stats.orders, 2);
        assert_eq!(stats.items, 4);
        assert!((stats.spent - 87.99).abs() < 1e-9);
    }
}
