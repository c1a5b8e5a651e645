//! Quote ledger: line items and the supplier quotes competing for them.

use serde::{Deserialize, Serialize};

use procura_core::{Entity, Money, find_by_id, find_by_id_mut};

use crate::ids::{InventoryRef, InvoiceRef, ItemId, QuoteId};

/// A supplier's offered unit price for one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub id: QuoteId,
    pub supplier_name: String,
    pub amount_per_unit: Money,
    pub invoice_ref: Option<InvoiceRef>,
    /// Winning flag; at most one quote per item carries it.
    pub approved_by_md: bool,
}

impl Entity for Quote {
    type Id = QuoteId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// A line of an order: a quantity of a referenced good plus its quotes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub item_ref: InventoryRef,
    pub quantity: i64,
    pub reason: Option<String>,
    pub quotes: Vec<Quote>,
}

impl Entity for Item {
    type Id = ItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Item {
    pub fn quote(&self, quote_id: QuoteId) -> Option<&Quote> {
        find_by_id(&self.quotes, &quote_id)
    }

    pub(crate) fn quote_mut(&mut self, quote_id: QuoteId) -> Option<&mut Quote> {
        find_by_id_mut(&mut self.quotes, &quote_id)
    }

    /// The winning quote, if one has been selected.
    pub fn winner(&self) -> Option<&Quote> {
        self.quotes.iter().find(|q| q.approved_by_md)
    }

    pub fn winner_count(&self) -> usize {
        self.quotes.iter().filter(|q| q.approved_by_md).count()
    }

    /// Make `quote_id` the only winner of this item.
    ///
    /// Every other quote is cleared before the new one is set, so the item
    /// never holds two winners. Returns the quote that lost its flag, if any.
    /// Unknown quote ids leave the item untouched.
    pub(crate) fn promote(&mut self, quote_id: QuoteId) -> Option<QuoteId> {
        if self.quote(quote_id).is_none() {
            return None;
        }

        let mut demoted = None;
        for q in self.quotes.iter_mut().filter(|q| q.id != quote_id) {
            if q.approved_by_md {
                q.approved_by_md = false;
                demoted = Some(q.id);
            }
        }

        if let Some(q) = self.quote_mut(quote_id) {
            q.approved_by_md = true;
        }
        demoted
    }

    /// Winning unit price × quantity.
    pub fn committed_cost(&self) -> Option<Money> {
        self.winner()
            .and_then(|q| q.amount_per_unit.checked_mul(self.quantity))
    }
}

/// Find a quote anywhere in the order.
pub fn find_quote(items: &[Item], quote_id: QuoteId) -> Option<&Quote> {
    items.iter().find_map(|i| i.quote(quote_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn quote(id: u32, cents: i64) -> Quote {
        Quote {
            id: QuoteId(id),
            supplier_name: format!("supplier-{id}"),
            amount_per_unit: Money::from_minor(cents),
            invoice_ref: None,
            approved_by_md: false,
        }
    }

    fn item(quotes: Vec<Quote>) -> Item {
        Item {
            id: ItemId(1),
            item_ref: InventoryRef::new("hay-bale").unwrap(),
            quantity: 3,
            reason: None,
            quotes,
        }
    }

    #[test]
    fn promote_replaces_previous_winner() {
        let mut it = item(vec![quote(1, 1000), quote(2, 800)]);

        assert_eq!(it.promote(QuoteId(2)), None);
        assert_eq!(it.promote(QuoteId(1)), Some(QuoteId(2)));

        assert_eq!(it.winner().map(|q| q.id), Some(QuoteId(1)));
        assert!(!it.quote(QuoteId(2)).unwrap().approved_by_md);
        assert_eq!(it.winner_count(), 1);
    }

    #[test]
    fn promote_unknown_quote_is_ignored() {
        let mut it = item(vec![quote(1, 1000)]);
        it.promote(QuoteId(1));

        assert_eq!(it.promote(QuoteId(9)), None);
        assert_eq!(it.winner().map(|q| q.id), Some(QuoteId(1)));
    }

    #[test]
    fn committed_cost_uses_winning_price() {
        let mut it = item(vec![quote(1, 1000), quote(2, 800)]);
        assert_eq!(it.committed_cost(), None);

        it.promote(QuoteId(2));
        assert_eq!(it.committed_cost(), Some(Money::from_minor(2400)));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: whatever sequence of selections is applied, an item never
        /// holds more than one winner and the last valid pick is the winner.
        #[test]
        fn at_most_one_winner_after_any_selection_sequence(
            picks in prop::collection::vec(1u32..6, 1..40)
        ) {
            let mut it = item((1..=4).map(|id| quote(id, 100 * id as i64)).collect());
            let mut last_valid = None;

            for pick in picks {
                it.promote(QuoteId(pick));
                if pick <= 4 {
                    last_valid = Some(QuoteId(pick));
                }
                prop_assert!(it.winner_count() <= 1);
            }

            prop_assert_eq!(it.winner().map(|q| q.id), last_valid);
        }
    }
}
