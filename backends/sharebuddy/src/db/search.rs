//! Catalog search over approved documents.
//!
//! Filters are appended as bound predicates to a [`QueryBuilder`]; the list
//! query and the count query share [`push_filters`] so totals always match.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};

use crate::error::AppResult;

use super::{Document, DOCUMENT_FROM, DOCUMENT_SELECT};

const SEARCH_VECTOR: &str = "to_tsvector('english', d.title || ' ' || d.description || ' ' || d.subject)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Relevance,
    Newest,
    Downloads,
    Rating,
    Cost,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub subject: Option<String>,
    pub university: Option<String>,
    pub course_code: Option<String>,
    pub file_type: Option<String>,
    pub author: Option<String>,
    pub min_rating: Option<f64>,
    pub max_cost: Option<i32>,
    #[serde(default)]
    pub free_only: bool,
    #[serde(default)]
    pub verified_only: bool,
    pub sort: Option<SortOrder>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Deepest page served; anything past it reads as an empty page.
const MAX_PAGE: i64 = 10_000;

impl SearchParams {
    /// The free-text query, if it has any non-blank content.
    pub fn text(&self) -> Option<&str> {
        self.q.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }

    /// Relevance only makes sense with a text query.
    pub fn effective_sort(&self) -> SortOrder {
        match (self.sort, self.text()) {
            (Some(SortOrder::Relevance), None) => SortOrder::Newest,
            (Some(sort), _) => sort,
            (None, Some(_)) => SortOrder::Relevance,
            (None, None) => SortOrder::Newest,
        }
    }

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(20).clamp(1, 100)
    }

    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).clamp(1, MAX_PAGE)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1) * self.limit()
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, params: &SearchParams) {
    builder.push(" WHERE d.status = 'approved'");

    if let Some(text) = params.text() {
        builder
            .push(" AND ")
            .push(SEARCH_VECTOR)
            .push(" @@ plainto_tsquery('english', ")
            .push_bind(text.to_string())
            .push(")");
    }
    if let Some(subject) = non_blank(&params.subject) {
        builder.push(" AND d.subject ILIKE ").push_bind(subject);
    }
    if let Some(university) = non_blank(&params.university) {
        builder.push(" AND d.university ILIKE ").push_bind(university);
    }
    if let Some(course_code) = non_blank(&params.course_code) {
        builder
            .push(" AND UPPER(d.course_code) = UPPER(")
            .push_bind(course_code)
            .push(")");
    }
    if let Some(file_type) = non_blank(&params.file_type) {
        builder
            .push(" AND LOWER(d.file_type) = LOWER(")
            .push_bind(file_type)
            .push(")");
    }
    if let Some(author) = non_blank(&params.author) {
        builder.push(" AND u.username = ").push_bind(author);
    }
    if let Some(min_rating) = params.min_rating {
        builder.push(" AND d.average_rating >= ").push_bind(min_rating);
    }
    if params.free_only {
        builder.push(" AND d.credit_cost = 0");
    } else if let Some(max_cost) = params.max_cost {
        builder.push(" AND d.credit_cost <= ").push_bind(max_cost);
    }
    if params.verified_only {
        builder.push(" AND u.is_verified_author");
    }
}

fn push_order(builder: &mut QueryBuilder<'_, Postgres>, params: &SearchParams) {
    match params.effective_sort() {
        SortOrder::Relevance => {
            // effective_sort only yields Relevance when text() is Some
            let text = params.text().unwrap_or_default().to_string();
            builder
                .push(" ORDER BY ts_rank(")
                .push(SEARCH_VECTOR)
                .push(", plainto_tsquery('english', ")
                .push_bind(text)
                .push(")) DESC, d.download_count DESC");
        }
        SortOrder::Newest => {
            builder.push(" ORDER BY d.created_at DESC");
        }
        SortOrder::Downloads => {
            builder.push(" ORDER BY d.download_count DESC, d.created_at DESC");
        }
        SortOrder::Rating => {
            builder.push(" ORDER BY d.average_rating DESC, d.rating_count DESC");
        }
        SortOrder::Cost => {
            builder.push(" ORDER BY d.credit_cost ASC, d.average_rating DESC");
        }
    }
    builder.push(", d.id DESC");
}

pub fn build_search_query(params: &SearchParams) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(DOCUMENT_SELECT);
    push_filters(&mut builder, params);
    push_order(&mut builder, params);
    builder
        .push(" LIMIT ")
        .push_bind(params.limit())
        .push(" OFFSET ")
        .push_bind(params.offset());
    builder
}

pub fn build_count_query(params: &SearchParams) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(format!("SELECT COUNT(*) {DOCUMENT_FROM}"));
    push_filters(&mut builder, params);
    builder
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    pub documents: Vec<Document>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

pub async fn search_documents(pool: &PgPool, params: &SearchParams) -> AppResult<SearchResults> {
    let documents = build_search_query(params)
        .build_query_as::<Document>()
        .fetch_all(pool)
        .await?;

    let total = build_count_query(params)
        .build_query_scalar::<i64>()
        .fetch_one(pool)
        .await?;

    Ok(SearchResults {
        documents,
        total,
        page: params.page(),
        limit: params.limit(),
    })
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SubjectCount {
    pub subject: String,
    pub document_count: i64,
}

pub async fn list_subjects(pool: &PgPool) -> AppResult<Vec<SubjectCount>> {
    Ok(sqlx::query_as::<_, SubjectCount>(
        r#"
        SELECT subject, COUNT(*) AS document_count
        FROM documents
        WHERE status = 'approved'
        GROUP BY subject
        ORDER BY document_count DESC, subject ASC
        "#,
    )
    .fetch_all(pool)
    .await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_search_lists_newest_approved() {
        let params = SearchParams::default();
        let builder = build_search_query(&params);
        let sql = builder.sql();

        assert!(sql.contains("WHERE d.status = 'approved'"));
        assert!(sql.contains("ORDER BY d.created_at DESC, d.id DESC"));
        assert!(sql.ends_with("LIMIT $1 OFFSET $2"));
        assert!(!sql.contains("plainto_tsquery"));
    }

    #[test]
    fn filters_are_bound_in_order() {
        let params = SearchParams {
            q: Some("  thermodynamics  ".into()),
            subject: Some("Physics".into()),
            course_code: Some("phys201".into()),
            min_rating: Some(4.0),
            max_cost: Some(5),
            verified_only: true,
            ..Default::default()
        };
        let builder = build_search_query(&params);
        let sql = builder.sql();

        assert!(sql.contains("@@ plainto_tsquery('english', $1)"));
        assert!(sql.contains("d.subject ILIKE $2"));
        assert!(sql.contains("UPPER(d.course_code) = UPPER($3)"));
        assert!(sql.contains("d.average_rating >= $4"));
        assert!(sql.contains("d.credit_cost <= $5"));
        assert!(sql.contains("AND u.is_verified_author"));
        assert!(sql.contains("ORDER BY ts_rank("));
        assert!(sql.ends_with("LIMIT $7 OFFSET $8"));
    }

    #[test]
    fn huge_page_offset_is_bounded() {
        let params = SearchParams {
            page: Some(i64::MAX),
            limit: Some(100),
            ..Default::default()
        };
        assert_eq!(params.page(), MAX_PAGE);
        assert_eq!(params.offset(), (MAX_PAGE - 1) * 100);

        let params = SearchParams {
            page: Some(i64::MIN),
            ..Default::default()
        };
        assert_eq!(params.offset(), 0);
    }

    #[test]
    fn blank_filters_are_ignored() {
        let params = SearchParams {
            q: Some("   ".into()),
            subject: Some("".into()),
            sort: Some(SortOrder::Relevance),
            ..Default::default()
        };
        let sql = build_count_query(&params).sql().to_string();

        assert_eq!(
            sql,
            "SELECT COUNT(*) FROM documents d INNER JOIN users u ON u.id = d.author_id \
             WHERE d.status = 'approved'"
        );
        assert_eq!(params.effective_sort(), SortOrder::Newest);
    }

    #[test]
    fn free_only_overrides_max_cost() {
        let params = SearchParams {
            free_only: true,
            max_cost: Some(10),
            ..Default::default()
        };
        let sql = build_count_query(&params).sql().to_string();
        assert!(sql.contains("d.credit_cost = 0"));
        assert!(!sql.contains("d.credit_cost <="));
    }

    #[test]
    fn paging_is_one_based_and_clamped() {
        let params = SearchParams {
            page: Some(3),
            limit: Some(500),
            ..Default::default()
        };
        assert_eq!(params.limit(), 100);
        assert_eq!(params.offset(), 200);

        let params = SearchParams {
            page: Some(0),
            ..Default::default()
        };
        assert_eq!(params.page(), 1);
        assert_eq!(params.offset(), 0);
    }

    #[test]
    fn text_query_defaults_to_relevance() {
        let params = SearchParams {
            q: Some("calculus".into()),
            ..Default::default()
        };
        assert_eq!(params.effective_sort(), SortOrder::Relevance);

        let params = SearchParams {
            q: Some("calculus".into()),
            sort: Some(SortOrder::Cost),
            ..Default::default()
        };
        assert_eq!(params.effective_sort(), SortOrder::Cost);
    }
}
