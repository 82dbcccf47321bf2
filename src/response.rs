use serde::Serialize;
use utoipa::ToSchema;

/// Paging details for list responses. Single-record responses carry an empty block.
#[derive(Debug, Serialize, ToSchema, Clone, Default)]
pub struct Meta {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub total: Option<i64>,
}

impl Meta {
    pub fn page(page: i64, per_page: i64, total: u64) -> Self {
        Self {
            page: Some(page),
            per_page: Some(per_page),
            total: Some(i64::try_from(total).unwrap_or(i64::MAX)),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

/// Envelope shared by every JSON response, errors included.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub message: String,
    pub data: Option<T>,
    pub meta: Option<Meta>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T, meta: Option<Meta>) -> Self {
        Self {
            message: message.into(),
            data: Some(data),
            meta,
        }
    }

    /// One record, no paging.
    pub fn single(message: impl Into<String>, data: T) -> Self {
        Self::success(message, data, Some(Meta::empty()))
    }

    pub fn paged(message: impl Into<String>, data: T, meta: Meta) -> Self {
        Self::success(message, data, Some(meta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_meta_reports_totals() {
        let meta = Meta::page(2, 20, 41);
        assert_eq!((meta.page, meta.per_page, meta.total), (Some(2), Some(20), Some(41)));
        assert!(Meta::empty().total.is_none());
    }

    #[test]
    fn single_responses_carry_empty_meta() {
        let resp = ApiResponse::single("OK", 7);
        assert_eq!(resp.data, Some(7));
        assert!(resp.meta.is_some_and(|m| m.page.is_none()));
    }
}
