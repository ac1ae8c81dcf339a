// ============================================================================
// Query Service - AlgoMint Marketplace Mirror
// ============================================================================
//
// Read-only pagination/filter surface over the mirror. Downstream of the
// reconciler: no business logic, no writes. Query parameters are validated
// once at the boundary into an immutable ListingQuery/TokenQuery value, then
// passed in; handlers never build ad-hoc filter bags.
//
// ============================================================================

use crate::models::{
    parse_price, Category, ListingState, Token, TransactionRecord, User, ValidationError,
};
use crate::store::{MirrorStore, StoreError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 12;
pub const MAX_PAGE_SIZE: u32 = 100;

// ============================================================================
// QUERY SPECIFICATIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    CreatedAt,
    Price,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Raw query-string shape as it arrives over HTTP
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListingQueryParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub category: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

/// Validated, immutable listing query. Constructed once at the boundary.
#[derive(Debug, Clone)]
pub struct ListingQuery {
    pub page: u32,
    pub limit: u32,
    pub category: Option<Category>,
    pub min_price: Option<u128>,
    pub max_price: Option<u128>,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
}

impl ListingQuery {
    pub fn from_params(params: &ListingQueryParams) -> Result<Self, ValidationError> {
        let (page, limit) = page_bounds(params.page, params.limit)?;

        let category = match &params.category {
            Some(raw) => Some(
                Category::parse(raw).ok_or_else(|| ValidationError::InvalidCategory(raw.clone()))?,
            ),
            None => None,
        };

        let min_price = match &params.min_price {
            Some(raw) => Some(parse_price(raw)?),
            None => None,
        };
        let max_price = match &params.max_price {
            Some(raw) => Some(parse_price(raw)?),
            None => None,
        };
        if let (Some(lo), Some(hi)) = (min_price, max_price) {
            if lo > hi {
                return Err(ValidationError::InvalidQuery(
                    "min_price must not exceed max_price".to_string(),
                ));
            }
        }

        let sort_by = match params.sort_by.as_deref() {
            None | Some("createdAt") => SortBy::CreatedAt,
            Some("price") => SortBy::Price,
            Some(other) => {
                return Err(ValidationError::InvalidQuery(format!(
                    "unknown sort_by: {}",
                    other
                )))
            }
        };
        let sort_order = match params.sort_order.as_deref() {
            None | Some("desc") => SortOrder::Desc,
            Some("asc") => SortOrder::Asc,
            Some(other) => {
                return Err(ValidationError::InvalidQuery(format!(
                    "unknown sort_order: {}",
                    other
                )))
            }
        };

        Ok(Self {
            page,
            limit,
            category,
            min_price,
            max_price,
            sort_by,
            sort_order,
        })
    }
}

/// Raw query-string shape for the token browse endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenQueryParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub category: Option<String>,
    pub purchasable: Option<bool>,
    pub creator: Option<String>,
}

/// Validated token browse query
#[derive(Debug, Clone)]
pub struct TokenQuery {
    pub page: u32,
    pub limit: u32,
    pub category: Option<Category>,
    pub purchasable: Option<bool>,
    pub creator: Option<String>,
}

impl TokenQuery {
    pub fn from_params(params: &TokenQueryParams) -> Result<Self, ValidationError> {
        let (page, limit) = page_bounds(params.page, params.limit)?;
        let category = match &params.category {
            Some(raw) => Some(
                Category::parse(raw).ok_or_else(|| ValidationError::InvalidCategory(raw.clone()))?,
            ),
            None => None,
        };
        Ok(Self {
            page,
            limit,
            category,
            purchasable: params.purchasable,
            creator: params.creator.clone(),
        })
    }
}

/// Shared page/limit validation: `page >= 1`, `limit in [1, MAX_PAGE_SIZE]`
pub fn page_bounds(page: Option<u32>, limit: Option<u32>) -> Result<(u32, u32), ValidationError> {
    let page = page.unwrap_or(DEFAULT_PAGE);
    if page < 1 {
        return Err(ValidationError::InvalidQuery("page must be >= 1".to_string()));
    }
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE);
    if limit < 1 || limit > MAX_PAGE_SIZE {
        return Err(ValidationError::InvalidQuery(format!(
            "limit must be in [1, {}]",
            MAX_PAGE_SIZE
        )));
    }
    Ok((page, limit))
}

// ============================================================================
// PAGINATION
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub limit: u32,
    pub total: usize,
    pub pages: usize,
}

fn paginate<T>(mut items: Vec<T>, page: u32, limit: u32) -> Page<T> {
    let total = items.len();
    let limit_usize = limit as usize;
    let pages = (total + limit_usize - 1) / limit_usize;
    let skip = (page as usize - 1) * limit_usize;

    let items = if skip >= total {
        Vec::new()
    } else {
        items.drain(skip..(skip + limit_usize).min(total)).collect()
    };

    Page {
        items,
        page,
        limit,
        total,
        pages,
    }
}

// ============================================================================
// QUERY SERVICE
// ============================================================================

/// User profile together with the derived ownership counters
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub user: User,
    pub owned_tokens: usize,
    pub created_tokens: usize,
}

pub struct QueryService {
    store: Arc<MirrorStore>,
}

impl QueryService {
    pub fn new(store: Arc<MirrorStore>) -> Self {
        Self { store }
    }

    /// Active marketplace listings with the full filter set
    pub fn listings(&self, query: &ListingQuery) -> Result<Page<Token>, StoreError> {
        let mut tokens = self.store.all_tokens()?;
        tokens.retain(|t| {
            t.listing_state == ListingState::Listed
                && t.purchasable
                && query.category.map_or(true, |c| t.category == c)
                && query.min_price.map_or(true, |lo| t.price.unwrap_or(0) >= lo)
                && query.max_price.map_or(true, |hi| t.price.unwrap_or(0) <= hi)
        });

        sort_tokens(&mut tokens, query.sort_by, query.sort_order);
        Ok(paginate(tokens, query.page, query.limit))
    }

    /// Browse all mirrored tokens, newest first
    pub fn tokens(&self, query: &TokenQuery) -> Result<Page<Token>, StoreError> {
        let mut tokens = self.store.all_tokens()?;
        tokens.retain(|t| {
            query.category.map_or(true, |c| t.category == c)
                && query.purchasable.map_or(true, |p| t.purchasable == p)
                && query
                    .creator
                    .as_deref()
                    .map_or(true, |creator| t.creator == creator)
        });

        sort_tokens(&mut tokens, SortBy::CreatedAt, SortOrder::Desc);
        Ok(paginate(tokens, query.page, query.limit))
    }

    pub fn token(&self, token_id: u64) -> Result<Option<Token>, StoreError> {
        self.store.token(token_id)
    }

    pub fn tokens_by_owner(
        &self,
        wallet: &str,
        page: u32,
        limit: u32,
    ) -> Result<Page<Token>, StoreError> {
        let mut tokens = self.store.all_tokens()?;
        tokens.retain(|t| t.owner == wallet);
        sort_tokens(&mut tokens, SortBy::CreatedAt, SortOrder::Desc);
        Ok(paginate(tokens, page, limit))
    }

    pub fn tokens_by_creator(
        &self,
        wallet: &str,
        page: u32,
        limit: u32,
    ) -> Result<Page<Token>, StoreError> {
        let mut tokens = self.store.all_tokens()?;
        tokens.retain(|t| t.creator == wallet);
        sort_tokens(&mut tokens, SortBy::CreatedAt, SortOrder::Desc);
        Ok(paginate(tokens, page, limit))
    }

    /// Applied facts touching one token, oldest first
    pub fn token_history(&self, token_id: u64) -> Result<Vec<TransactionRecord>, StoreError> {
        self.store.records_for_token(token_id)
    }

    pub fn profile(&self, wallet: &str) -> Result<Option<UserProfile>, StoreError> {
        let user = match self.store.user(wallet)? {
            Some(user) => user,
            None => return Ok(None),
        };
        let tokens = self.store.all_tokens()?;
        let owned_tokens = tokens.iter().filter(|t| t.owner == wallet).count();
        let created_tokens = tokens.iter().filter(|t| t.creator == wallet).count();
        Ok(Some(UserProfile {
            user,
            owned_tokens,
            created_tokens,
        }))
    }
}

fn sort_tokens(tokens: &mut [Token], sort_by: SortBy, order: SortOrder) {
    tokens.sort_by(|a, b| {
        let ordering = match sort_by {
            SortBy::CreatedAt => a.created_at.cmp(&b.created_at),
            SortBy::Price => a.price.unwrap_or(0).cmp(&b.price.unwrap_or(0)),
        };
        // token_id tiebreak keeps page boundaries stable
        let ordering = ordering.then_with(|| a.token_id.cmp(&b.token_id));
        match order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TxKind, TxStatus};

    fn token(token_id: u64, price: Option<u128>, category: Category, created_at: u64) -> Token {
        Token {
            token_id,
            creator: "L1ALICE000000001".to_string(),
            owner: "L1ALICE000000001".to_string(),
            name: format!("Token #{}", token_id),
            description: "test".to_string(),
            image: "sha256:img".to_string(),
            metadata_uri: "sha256:meta".to_string(),
            category,
            purchasable: true,
            price,
            listing_state: if price.is_some() {
                ListingState::Listed
            } else {
                ListingState::Unlisted
            },
            attributes: vec![],
            created_at,
            updated_at: created_at,
        }
    }

    fn record(fact_id: &str, token_id: u64) -> TransactionRecord {
        TransactionRecord {
            fact_id: fact_id.to_string(),
            token_id,
            kind: TxKind::Mint,
            from: "L1ALICE000000001".to_string(),
            to: None,
            price: None,
            fee: None,
            status: TxStatus::Confirmed,
            applied_at: 1,
            block_number: None,
        }
    }

    fn service_with(tokens: Vec<Token>) -> (tempfile::TempDir, QueryService) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(MirrorStore::open(dir.path()).expect("open store"));
        for t in &tokens {
            store
                .commit_applied(t, &record(&format!("0xmint{}", t.token_id), t.token_id))
                .expect("seed token");
        }
        (dir, QueryService::new(store))
    }

    #[test]
    fn test_listing_query_validates_limits() {
        let params = ListingQueryParams {
            limit: Some(101),
            ..Default::default()
        };
        assert!(ListingQuery::from_params(&params).is_err());

        let params = ListingQueryParams {
            page: Some(0),
            ..Default::default()
        };
        assert!(ListingQuery::from_params(&params).is_err());

        let params = ListingQueryParams::default();
        let q = ListingQuery::from_params(&params).unwrap();
        assert_eq!(q.page, 1);
        assert_eq!(q.limit, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_listing_query_rejects_inverted_price_range() {
        let params = ListingQueryParams {
            min_price: Some("100".to_string()),
            max_price: Some("50".to_string()),
            ..Default::default()
        };
        assert!(ListingQuery::from_params(&params).is_err());
    }

    #[test]
    fn test_listings_filter_and_price_sort() {
        let (_dir, svc) = service_with(vec![
            token(1, Some(300), Category::Art, 10),
            token(2, Some(100), Category::Art, 20),
            token(3, Some(200), Category::Music, 30),
            token(4, None, Category::Art, 40), // unlisted, excluded
        ]);

        let params = ListingQueryParams {
            sort_by: Some("price".to_string()),
            sort_order: Some("asc".to_string()),
            ..Default::default()
        };
        let q = ListingQuery::from_params(&params).unwrap();
        let page = svc.listings(&q).unwrap();

        assert_eq!(page.total, 3);
        let ids: Vec<u64> = page.items.iter().map(|t| t.token_id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn test_listings_category_and_price_range() {
        let (_dir, svc) = service_with(vec![
            token(1, Some(300), Category::Art, 10),
            token(2, Some(100), Category::Art, 20),
            token(3, Some(200), Category::Music, 30),
        ]);

        let params = ListingQueryParams {
            category: Some("art".to_string()),
            min_price: Some("200".to_string()),
            ..Default::default()
        };
        let q = ListingQuery::from_params(&params).unwrap();
        let page = svc.listings(&q).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].token_id, 1);
    }

    #[test]
    fn test_pagination_shape() {
        let tokens: Vec<Token> = (1..=25)
            .map(|i| token(i, Some(i as u128 * 10), Category::Art, i))
            .collect();
        let (_dir, svc) = service_with(tokens);

        let params = ListingQueryParams {
            page: Some(3),
            limit: Some(10),
            sort_by: Some("createdAt".to_string()),
            sort_order: Some("asc".to_string()),
            ..Default::default()
        };
        let q = ListingQuery::from_params(&params).unwrap();
        let page = svc.listings(&q).unwrap();

        assert_eq!(page.total, 25);
        assert_eq!(page.pages, 3);
        assert_eq!(page.items.len(), 5);
        assert_eq!(page.items[0].token_id, 21);

        // Past the last page: empty items, same totals
        let params = ListingQueryParams {
            page: Some(9),
            limit: Some(10),
            ..Default::default()
        };
        let q = ListingQuery::from_params(&params).unwrap();
        let page = svc.listings(&q).unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.total, 25);
    }

    #[test]
    fn test_tokens_by_owner() {
        let mut other = token(2, None, Category::Art, 20);
        other.owner = "L1BOB00000000001".to_string();
        let (_dir, svc) = service_with(vec![token(1, None, Category::Art, 10), other]);

        let page = svc.tokens_by_owner("L1BOB00000000001", 1, 12).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].token_id, 2);
    }
}
