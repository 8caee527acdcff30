//! Store-tool guard rails: basket normalisation, bounded pagination over the
//! product catalog, and coupon verification across apply attempts.

use std::fmt;
use std::future::Future;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

pub const DEFAULT_MAX_PAGE_LIMIT: i64 = 5;
pub const DEFAULT_MIN_PAGE_LIMIT: i64 = 1;
pub const DEFAULT_MAX_PAGINATION_ROUNDS: usize = 4;

lazy_static! {
    static ref AMOUNT_DECORATIONS: Regex = Regex::new(r"[$,\s]").expect("static pattern");
}

/// One catalog page request, as the pagination guard sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductQuery {
    pub offset: i64,
    pub limit: i64,
    #[serde(default)]
    pub query: Option<String>,
}

/// One catalog page response. Unknown payload fields ride along untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductPage {
    #[serde(default)]
    pub products: Vec<Value>,
    #[serde(default = "default_next_offset")]
    pub next_offset: i64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

fn default_next_offset() -> i64 {
    -1
}

/// Ensures basket views always carry item lists instead of nulls.
pub fn normalize_basket_view(payload: Value) -> Value {
    let mut normalized = match payload {
        Value::Object(map) => map,
        other => {
            let mut map = serde_json::Map::new();
            if !other.is_null() {
                map.insert("value".to_string(), other);
            }
            map
        }
    };
    let items = match normalized.remove("items") {
        None | Some(Value::Null) => Value::Array(vec![]),
        Some(Value::Array(items)) => {
            Value::Array(items.into_iter().filter(|item| !item.is_null()).collect())
        }
        Some(single) => Value::Array(vec![single]),
    };
    normalized.insert("items".to_string(), items);
    Value::Object(normalized)
}

/// Caps catalog pagination requests and aggregates follow-up pages, stepping
/// the page limit down when the platform rejects a page size.
#[derive(Debug, Clone)]
pub struct PaginationGuard {
    max_limit: i64,
    min_limit: i64,
    max_rounds: usize,
}

impl Default for PaginationGuard {
    fn default() -> Self {
        Self {
            max_limit: DEFAULT_MAX_PAGE_LIMIT,
            min_limit: DEFAULT_MIN_PAGE_LIMIT,
            max_rounds: DEFAULT_MAX_PAGINATION_ROUNDS,
        }
    }
}

impl PaginationGuard {
    pub fn new(max_limit: i64, min_limit: i64, max_rounds: usize) -> Self {
        Self {
            max_limit,
            min_limit,
            max_rounds,
        }
    }

    pub async fn paginate<F, Fut, E>(
        &self,
        request: ProductQuery,
        mut dispatch: F,
    ) -> Result<ProductPage, E>
    where
        F: FnMut(ProductQuery) -> Fut,
        Fut: Future<Output = Result<ProductPage, E>>,
        E: fmt::Display,
    {
        let mut request = self.sanitize(request);
        let mut aggregated: Vec<Value> = Vec::new();
        let mut last_page = ProductPage::default();
        let mut rounds = 0;

        while rounds < self.max_rounds {
            let page = match dispatch(request.clone()).await {
                Ok(page) => page,
                Err(error) => {
                    if self.should_reduce_limit(&error, request.limit) {
                        request.limit = (request.limit - 1).max(self.min_limit);
                        info!(
                            limit = request.limit,
                            "reduced product page limit after error: {}", error
                        );
                        continue;
                    }
                    return Err(error);
                }
            };

            aggregated.extend(page.products.iter().cloned());
            let next_offset = page.next_offset;
            last_page = page;
            if next_offset == -1 || next_offset == request.offset {
                break;
            }
            debug!(next_offset, "fetching next catalog page");
            request.offset = next_offset;
            rounds += 1;
        }

        last_page.products = aggregated;
        last_page.next_offset = -1;
        Ok(last_page)
    }

    fn sanitize(&self, mut request: ProductQuery) -> ProductQuery {
        if request.limit < self.min_limit || request.limit > self.max_limit {
            request.limit = self.max_limit;
        }
        if request.offset < 0 {
            request.offset = 0;
        }
        request
    }

    fn should_reduce_limit(&self, error: &impl fmt::Display, current_limit: i64) -> bool {
        if current_limit <= self.min_limit {
            return false;
        }
        let text = error.to_string().to_lowercase();
        text.contains("page limit") || text.contains("limit exceeded")
    }
}

/// Tracks the coupon that delivered the best strictly-positive discount.
#[derive(Debug, Clone, Default)]
pub struct CouponVerifier {
    best_coupon: Option<String>,
    best_discount: Option<f64>,
}

impl CouponVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn best_coupon(&self) -> Option<&str> {
        self.best_coupon.as_deref()
    }

    pub fn best_discount(&self) -> Option<f64> {
        self.best_discount
    }

    /// Judges a coupon by the basket view it produced. Returns whether it is
    /// the new best, with a message suitable for the conversation.
    pub fn evaluate(&mut self, coupon_code: &str, basket: &Value) -> (bool, String) {
        let discount = parse_amount(basket.get("discount"));
        let (accepted, message) = match discount {
            None => (false, "coupon resulted in null discount".to_string()),
            Some(value) if value <= 0.0 => {
                (false, "coupon offered a non-positive discount".to_string())
            }
            Some(value) => match self.best_discount {
                Some(best) if value <= best => {
                    (false, format!("discount {} <= best {}", value, best))
                }
                _ => {
                    self.best_discount = Some(value);
                    self.best_coupon = Some(coupon_code.to_string());
                    (true, format!("new best discount {}", value))
                }
            },
        };
        info!(coupon = coupon_code, accepted, "{}", message);
        (accepted, message)
    }
}

/// Parses amounts that may arrive as numbers or currency-decorated strings.
fn parse_amount(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => AMOUNT_DECORATIONS.replace_all(s, "").parse::<f64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_normalize_basket_view() {
        let normalized = normalize_basket_view(json!({"items": null, "total": "9.99"}));
        assert_eq!(normalized, json!({"items": [], "total": "9.99"}));

        let normalized = normalize_basket_view(json!({"items": [{"id": 1}, null]}));
        assert_eq!(normalized, json!({"items": [{"id": 1}]}));

        let normalized = normalize_basket_view(json!({"items": {"id": 1}}));
        assert_eq!(normalized, json!({"items": [{"id": 1}]}));

        let normalized = normalize_basket_view(json!({}));
        assert_eq!(normalized, json!({"items": []}));
    }

    #[tokio::test]
    async fn test_paginate_aggregates_pages() {
        let guard = PaginationGuard::default();
        let pages = vec![
            ProductPage {
                products: vec![json!({"id": "p1"}), json!({"id": "p2"})],
                next_offset: 2,
                extra: serde_json::Map::new(),
            },
            ProductPage {
                products: vec![json!({"id": "p3"})],
                next_offset: -1,
                extra: serde_json::Map::new(),
            },
        ];
        let mut served = 0usize;
        let result: Result<ProductPage, std::convert::Infallible> = guard
            .paginate(
                ProductQuery {
                    offset: 0,
                    limit: 2,
                    query: None,
                },
                |request| {
                    let page = pages[served].clone();
                    served += 1;
                    assert!(request.limit <= DEFAULT_MAX_PAGE_LIMIT);
                    async move { Ok(page) }
                },
            )
            .await;
        let page = result.unwrap();
        assert_eq!(page.products.len(), 3);
        assert_eq!(page.next_offset, -1);
        assert_eq!(served, 2);
    }

    #[tokio::test]
    async fn test_paginate_reduces_limit_on_page_errors() {
        let guard = PaginationGuard::default();
        let mut seen_limits = Vec::new();
        let result: Result<ProductPage, String> = guard
            .paginate(
                ProductQuery {
                    offset: 0,
                    limit: 5,
                    query: None,
                },
                |request| {
                    seen_limits.push(request.limit);
                    let outcome = if request.limit > 3 {
                        Err("page limit exceeded".to_string())
                    } else {
                        Ok(ProductPage {
                            products: vec![json!({"id": "p1"})],
                            next_offset: -1,
                            extra: serde_json::Map::new(),
                        })
                    };
                    async move { outcome }
                },
            )
            .await;
        assert!(result.is_ok());
        assert_eq!(seen_limits, vec![5, 4, 3]);
    }

    #[tokio::test]
    async fn test_paginate_propagates_other_errors() {
        let guard = PaginationGuard::default();
        let result: Result<ProductPage, String> = guard
            .paginate(
                ProductQuery {
                    offset: 0,
                    limit: 2,
                    query: None,
                },
                |_| async { Err("basket is on fire".to_string()) },
            )
            .await;
        assert_eq!(result.unwrap_err(), "basket is on fire");
    }

    #[test]
    fn test_sanitize_bounds() {
        let guard = PaginationGuard::default();
        let sanitized = guard.sanitize(ProductQuery {
            offset: -3,
            limit: 99,
            query: None,
        });
        assert_eq!(sanitized.offset, 0);
        assert_eq!(sanitized.limit, DEFAULT_MAX_PAGE_LIMIT);
    }

    #[test]
    fn test_coupon_verifier_tracks_best() {
        let mut verifier = CouponVerifier::new();

        let (accepted, _) = verifier.evaluate("SAVE10", &json!({"discount": "$10.00"}));
        assert!(accepted);
        let (accepted, message) = verifier.evaluate("SAVE5", &json!({"discount": 5.0}));
        assert!(!accepted);
        assert!(message.contains("<= best"));
        let (accepted, _) = verifier.evaluate("SAVE20", &json!({"discount": "20"}));
        assert!(accepted);
        assert_eq!(verifier.best_coupon(), Some("SAVE20"));
        assert_eq!(verifier.best_discount(), Some(20.0));
    }

    #[test]
    fn test_coupon_verifier_rejects_null_and_zero() {
        let mut verifier = CouponVerifier::new();
        let (accepted, message) = verifier.evaluate("NOPE", &json!({"discount": null}));
        assert!(!accepted);
        assert!(message.contains("null discount"));

        let (accepted, _) = verifier.evaluate("ZERO", &json!({"discount": 0}));
        assert!(!accepted);
        assert!(verifier.best_coupon().is_none());
    }
}
