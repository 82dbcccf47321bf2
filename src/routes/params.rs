use serde::Deserialize;
use utoipa::ToSchema;

use crate::{
    error::{AppError, AppResult},
    models::OrderStatus,
    store::OrderQuery,
};

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct Pagination {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl Pagination {
    pub fn normalize(&self) -> (i64, i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self.per_page.unwrap_or(20).clamp(1, 100);
        let offset = (page - 1).saturating_mul(per_page);
        (page, per_page, offset)
    }
}

#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    Desc,
}

// Paging fields are inline rather than a flattened `Pagination`: query-string numbers do not
// survive serde's flatten buffering.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct OrderListQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub status: Option<String>,
    pub sort_order: Option<SortOrder>,
}

impl OrderListQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination {
            page: self.page,
            per_page: self.per_page,
        }
    }

    /// Page, page size and the store filter. Unknown status names are rejected.
    pub fn to_store_query(&self) -> AppResult<(i64, i64, OrderQuery)> {
        let (page, per_page, offset) = self.pagination().normalize();
        let status = match self.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => Some(
                OrderStatus::parse(raw)
                    .ok_or_else(|| AppError::BadRequest("Invalid order status".into()))?,
            ),
            None => None,
        };
        let newest_first = matches!(self.sort_order.unwrap_or(SortOrder::Desc), SortOrder::Desc);
        Ok((
            page,
            per_page,
            OrderQuery {
                status,
                newest_first,
                limit: per_page as u64,
                offset: offset as u64,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_is_clamped() {
        let p = Pagination {
            page: Some(0),
            per_page: Some(500),
        };
        assert_eq!(p.normalize(), (1, 100, 0));
        let p = Pagination {
            page: Some(3),
            per_page: Some(10),
        };
        assert_eq!(p.normalize(), (3, 10, 20));
    }

    #[test]
    fn huge_page_numbers_saturate() {
        let query = OrderListQuery {
            page: Some(i64::MAX),
            per_page: Some(100),
            ..Default::default()
        };
        let (page, per_page, store_query) = query.to_store_query().unwrap();
        assert_eq!((page, per_page), (i64::MAX, 100));
        assert_eq!(store_query.offset, i64::MAX as u64);
        assert_eq!(store_query.limit, 100);
    }

    #[test]
    fn status_filter_uses_display_names() {
        let query = OrderListQuery {
            status: Some("Payment Pending".into()),
            sort_order: Some(SortOrder::Asc),
            ..Default::default()
        };
        let (_, _, store_query) = query.to_store_query().unwrap();
        assert_eq!(store_query.status, Some(OrderStatus::PaymentPending));
        assert!(!store_query.newest_first);

        let bad = OrderListQuery {
            status: Some("Lost".into()),
            ..Default::default()
        };
        assert!(matches!(bad.to_store_query(), Err(AppError::BadRequest(_))));
    }
}
