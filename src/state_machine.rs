// ============================================================================
// Listing State Machine - AlgoMint Marketplace Mirror
// ============================================================================
//
// Per-token transition logic for ledger facts:
//
//   Unlisted -> Listed -> { sold: fresh Unlisted cycle under the buyer,
//                           delisted: back to Unlisted }
//
// The machine is pure: it looks at the current token (if any) and a fact, and
// either produces the next token state plus the derived transaction fields,
// or a ConflictError naming the violated precondition. It never touches the
// store; the reconciler owns persistence and atomicity.
//
// ============================================================================

use crate::fees::FeeCalculator;
use crate::models::{Fact, ListingState, Token, TxKind, TxStatus, TransactionRecord};
use serde::Serialize;
use std::fmt;

// ============================================================================
// ERRORS
// ============================================================================

/// Fact is semantically invalid against the current mirror state.
/// The offending fact is NOT marked applied; a corrected resubmission can
/// still succeed.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub enum ConflictError {
    TokenNotFound(u64),
    TokenAlreadyMinted(u64),
    NotOwner { token_id: u64, wallet: String },
    NotPurchasable(u64),
    NotListed(u64),
    InsufficientPayment { token_id: u64, offered: u128, required: u128 },
}

impl ConflictError {
    /// Stable machine-readable tag for API responses
    pub fn code(&self) -> &'static str {
        match self {
            ConflictError::TokenNotFound(_) => "token_not_found",
            ConflictError::TokenAlreadyMinted(_) => "token_already_minted",
            ConflictError::NotOwner { .. } => "not_owner",
            ConflictError::NotPurchasable(_) => "not_purchasable",
            ConflictError::NotListed(_) => "not_listed",
            ConflictError::InsufficientPayment { .. } => "insufficient_payment",
        }
    }
}

impl fmt::Display for ConflictError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictError::TokenNotFound(id) => write!(f, "token {} not found", id),
            ConflictError::TokenAlreadyMinted(id) => write!(f, "token {} already minted", id),
            ConflictError::NotOwner { token_id, wallet } => {
                write!(f, "{} is not the owner of token {}", wallet, token_id)
            }
            ConflictError::NotPurchasable(id) => write!(f, "token {} is not purchasable", id),
            ConflictError::NotListed(id) => write!(f, "token {} is not listed", id),
            ConflictError::InsufficientPayment { token_id, offered, required } => write!(
                f,
                "insufficient payment for token {}: offered {} < required {}",
                token_id, offered, required
            ),
        }
    }
}

impl std::error::Error for ConflictError {}

// ============================================================================
// TRANSITION RESULT
// ============================================================================

/// Payout instructions derived from a sale. Recorded by the mirror, executed
/// by the ledger.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SaleEffects {
    pub seller: String,
    pub proceeds: u128,
    pub fee: u128,
    pub fee_recipient: String,
}

/// Validated outcome of applying one fact to one token
#[derive(Debug, Clone)]
pub struct Transition {
    /// Token state after the fact
    pub token: Token,
    pub kind: TxKind,
    pub from: String,
    pub to: Option<String>,
    pub price: Option<u128>,
    pub fee: Option<u128>,
    /// Change to the count of currently-listed tokens (-1, 0 or +1)
    pub listed_delta: i64,
    pub sale: Option<SaleEffects>,
}

impl Transition {
    /// Derive the append-only record for this transition
    pub fn record(&self, fact_id: &str, applied_at: u64, block_number: Option<u64>) -> TransactionRecord {
        TransactionRecord {
            fact_id: fact_id.to_string(),
            token_id: self.token.token_id,
            kind: self.kind,
            from: self.from.clone(),
            to: self.to.clone(),
            price: self.price,
            fee: self.fee,
            status: TxStatus::Confirmed,
            applied_at,
            block_number,
        }
    }
}

// ============================================================================
// STATE MACHINE
// ============================================================================

#[derive(Debug, Clone)]
pub struct ListingStateMachine {
    fees: FeeCalculator,
    fee_recipient: String,
}

impl ListingStateMachine {
    pub fn new(fees: FeeCalculator, fee_recipient: &str) -> Self {
        Self {
            fees,
            fee_recipient: fee_recipient.to_string(),
        }
    }

    pub fn fees(&self) -> &FeeCalculator {
        &self.fees
    }

    /// Validate `fact` against `current` and produce the resulting transition.
    pub fn transition(
        &self,
        current: Option<&Token>,
        fact: &Fact,
        now: u64,
    ) -> Result<Transition, ConflictError> {
        match fact {
            Fact::Minted {
                token_id,
                creator,
                owner,
                purchasable,
                price,
                metadata_uri,
                name,
                description,
                image,
                category,
                attributes,
                ..
            } => {
                if current.is_some() {
                    return Err(ConflictError::TokenAlreadyMinted(*token_id));
                }
                // A mint lands directly in Listed only when the creator asked
                // for it and supplied a price.
                let listed = *purchasable && price.is_some();
                let token = Token {
                    token_id: *token_id,
                    creator: creator.clone(),
                    owner: owner.clone(),
                    name: name.clone(),
                    description: description.clone(),
                    image: image.clone(),
                    metadata_uri: metadata_uri.clone(),
                    category: *category,
                    purchasable: *purchasable,
                    price: if listed { *price } else { None },
                    listing_state: if listed { ListingState::Listed } else { ListingState::Unlisted },
                    attributes: attributes.clone(),
                    created_at: now,
                    updated_at: now,
                };
                let price = token.price;
                Ok(Transition {
                    from: creator.clone(),
                    to: Some(owner.clone()),
                    kind: TxKind::Mint,
                    price,
                    fee: None,
                    listed_delta: if listed { 1 } else { 0 },
                    sale: None,
                    token,
                })
            }

            Fact::Listed { token_id, price, by, .. } => {
                let token = current.ok_or(ConflictError::TokenNotFound(*token_id))?;
                if token.owner != *by {
                    return Err(ConflictError::NotOwner {
                        token_id: *token_id,
                        wallet: by.clone(),
                    });
                }
                if !token.purchasable {
                    return Err(ConflictError::NotPurchasable(*token_id));
                }
                // Re-listing an already-listed token is an idempotent price
                // update, not a conflict.
                let already_listed = token.is_listed();
                let mut next = token.clone();
                next.price = Some(*price);
                next.listing_state = ListingState::Listed;
                next.updated_at = now;
                Ok(Transition {
                    token: next,
                    kind: TxKind::List,
                    from: by.clone(),
                    to: None,
                    price: Some(*price),
                    fee: None,
                    listed_delta: if already_listed { 0 } else { 1 },
                    sale: None,
                })
            }

            Fact::Delisted { token_id, by, .. } => {
                let token = current.ok_or(ConflictError::TokenNotFound(*token_id))?;
                if !token.is_listed() {
                    return Err(ConflictError::NotListed(*token_id));
                }
                if token.owner != *by {
                    return Err(ConflictError::NotOwner {
                        token_id: *token_id,
                        wallet: by.clone(),
                    });
                }
                let mut next = token.clone();
                next.price = None;
                next.listing_state = ListingState::Unlisted;
                next.updated_at = now;
                Ok(Transition {
                    token: next,
                    kind: TxKind::Delist,
                    from: by.clone(),
                    to: None,
                    price: None,
                    fee: None,
                    listed_delta: -1,
                    sale: None,
                })
            }

            Fact::Sold { token_id, buyer, price, .. } => {
                let token = current.ok_or(ConflictError::TokenNotFound(*token_id))?;
                if !token.is_listed() {
                    return Err(ConflictError::NotListed(*token_id));
                }
                let asking = token.price.ok_or(ConflictError::NotListed(*token_id))?;
                if *price < asking {
                    return Err(ConflictError::InsufficientPayment {
                        token_id: *token_id,
                        offered: *price,
                        required: asking,
                    });
                }
                // Fee is charged on the amount actually paid
                let split = self.fees.breakdown(*price);
                let seller = token.owner.clone();
                let mut next = token.clone();
                next.owner = buyer.clone();
                next.price = None;
                next.listing_state = ListingState::Unlisted;
                next.updated_at = now;
                Ok(Transition {
                    token: next,
                    kind: TxKind::Sale,
                    from: seller.clone(),
                    to: Some(buyer.clone()),
                    price: Some(*price),
                    fee: Some(split.fee),
                    listed_delta: -1,
                    sale: Some(SaleEffects {
                        seller,
                        proceeds: split.proceeds,
                        fee: split.fee,
                        fee_recipient: self.fee_recipient.clone(),
                    }),
                })
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;

    const ALICE: &str = "L1ALICE000000001";
    const BOB: &str = "L1BOB00000000001";
    const FEE_WALLET: &str = "L1FEES0000000001";

    fn machine() -> ListingStateMachine {
        ListingStateMachine::new(FeeCalculator::new(250), FEE_WALLET)
    }

    fn minted(token_id: u64, purchasable: bool, price: Option<u128>) -> Fact {
        Fact::Minted {
            fact_id: format!("0xmint{}", token_id),
            token_id,
            creator: ALICE.to_string(),
            owner: ALICE.to_string(),
            purchasable,
            price,
            metadata_uri: "sha256:meta".to_string(),
            name: "Sunset #1".to_string(),
            description: "a sunset".to_string(),
            image: "sha256:img".to_string(),
            category: Category::Art,
            attributes: vec![],
        }
    }

    fn mint_token(token_id: u64, purchasable: bool, price: Option<u128>) -> Token {
        machine()
            .transition(None, &minted(token_id, purchasable, price), 1_000)
            .unwrap()
            .token
    }

    #[test]
    fn test_mint_purchasable_with_price_lists_immediately() {
        let t = machine().transition(None, &minted(1, true, Some(500)), 1_000).unwrap();
        assert_eq!(t.token.listing_state, ListingState::Listed);
        assert_eq!(t.token.price, Some(500));
        assert_eq!(t.listed_delta, 1);
        assert_eq!(t.kind, TxKind::Mint);
    }

    #[test]
    fn test_mint_without_price_starts_unlisted() {
        let t = machine().transition(None, &minted(2, true, None), 1_000).unwrap();
        assert_eq!(t.token.listing_state, ListingState::Unlisted);
        assert_eq!(t.token.price, None);
        assert_eq!(t.listed_delta, 0);
    }

    #[test]
    fn test_mint_twice_conflicts() {
        let token = mint_token(3, true, Some(500));
        let err = machine()
            .transition(Some(&token), &minted(3, true, Some(500)), 1_001)
            .unwrap_err();
        assert_eq!(err, ConflictError::TokenAlreadyMinted(3));
    }

    #[test]
    fn test_list_requires_purchasable() {
        let token = mint_token(4, false, None);
        let fact = Fact::Listed {
            fact_id: "0xlist4".to_string(),
            token_id: 4,
            price: 900,
            by: ALICE.to_string(),
        };
        let err = machine().transition(Some(&token), &fact, 1_001).unwrap_err();
        assert_eq!(err, ConflictError::NotPurchasable(4));
    }

    #[test]
    fn test_list_requires_owner() {
        let token = mint_token(5, true, None);
        let fact = Fact::Listed {
            fact_id: "0xlist5".to_string(),
            token_id: 5,
            price: 900,
            by: BOB.to_string(),
        };
        let err = machine().transition(Some(&token), &fact, 1_001).unwrap_err();
        assert_eq!(err, ConflictError::NotOwner { token_id: 5, wallet: BOB.to_string() });
    }

    #[test]
    fn test_relist_updates_price_without_counting_twice() {
        let token = mint_token(6, true, Some(500));
        assert!(token.is_listed());
        let fact = Fact::Listed {
            fact_id: "0xlist6".to_string(),
            token_id: 6,
            price: 800,
            by: ALICE.to_string(),
        };
        let t = machine().transition(Some(&token), &fact, 1_001).unwrap();
        assert_eq!(t.token.price, Some(800));
        assert_eq!(t.listed_delta, 0);
    }

    #[test]
    fn test_delist_only_from_listed() {
        let token = mint_token(7, true, None);
        let fact = Fact::Delisted {
            fact_id: "0xdelist7".to_string(),
            token_id: 7,
            by: ALICE.to_string(),
        };
        let err = machine().transition(Some(&token), &fact, 1_001).unwrap_err();
        assert_eq!(err, ConflictError::NotListed(7));
    }

    #[test]
    fn test_sold_on_unlisted_rejected() {
        let token = mint_token(8, true, None);
        let fact = Fact::Sold {
            fact_id: "0xsale8".to_string(),
            token_id: 8,
            buyer: BOB.to_string(),
            price: 1_000,
        };
        let err = machine().transition(Some(&token), &fact, 1_001).unwrap_err();
        assert_eq!(err, ConflictError::NotListed(8));
    }

    #[test]
    fn test_sold_rejects_insufficient_payment() {
        let token = mint_token(9, true, Some(1_000));
        let fact = Fact::Sold {
            fact_id: "0xsale9".to_string(),
            token_id: 9,
            buyer: BOB.to_string(),
            price: 999,
        };
        let err = machine().transition(Some(&token), &fact, 1_001).unwrap_err();
        assert_eq!(
            err,
            ConflictError::InsufficientPayment { token_id: 9, offered: 999, required: 1_000 }
        );
    }

    #[test]
    fn test_sold_transfers_owner_and_charges_fee_on_paid_price() {
        let token = mint_token(10, true, Some(1_000));
        let fact = Fact::Sold {
            fact_id: "0xsale10".to_string(),
            token_id: 10,
            buyer: BOB.to_string(),
            // Overpaying is allowed; the fee applies to the paid amount
            price: 2_000,
        };
        let t = machine().transition(Some(&token), &fact, 1_001).unwrap();
        assert_eq!(t.token.owner, BOB);
        assert_eq!(t.token.listing_state, ListingState::Unlisted);
        assert_eq!(t.token.price, None);
        assert_eq!(t.fee, Some(50)); // 2_000 * 250 / 10_000
        assert_eq!(t.listed_delta, -1);

        let sale = t.sale.unwrap();
        assert_eq!(sale.seller, ALICE);
        assert_eq!(sale.proceeds, 1_950);
        assert_eq!(sale.fee_recipient, FEE_WALLET);
    }

    #[test]
    fn test_sold_token_can_be_relisted_by_buyer() {
        let token = mint_token(11, true, Some(1_000));
        let sold = Fact::Sold {
            fact_id: "0xsale11".to_string(),
            token_id: 11,
            buyer: BOB.to_string(),
            price: 1_000,
        };
        let after_sale = machine().transition(Some(&token), &sold, 1_001).unwrap().token;

        let relist = Fact::Listed {
            fact_id: "0xlist11b".to_string(),
            token_id: 11,
            price: 5_000,
            by: BOB.to_string(),
        };
        let t = machine().transition(Some(&after_sale), &relist, 1_002).unwrap();
        assert_eq!(t.token.owner, BOB);
        assert!(t.token.is_listed());
        assert_eq!(t.token.price, Some(5_000));
    }
}
