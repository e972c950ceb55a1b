//! Cart and pricing calculator for BrewDesk.
//!
//! Pure functions over an in-memory cart of menu item snapshots. Prices
//! are currency minor-unit integers (IDR, no decimals); percentage
//! discounts round down to the minor unit.

use serde::{Deserialize, Serialize};

use crate::vouchers::VoucherDiscount;

/// Checkout totals at or above this subtotal earn the loyalty bonus.
pub const LOYALTY_BONUS_THRESHOLD: i64 = 50_000;
/// Flat points awarded for a qualifying checkout.
pub const LOYALTY_BONUS_POINTS: i64 = 10;

/// One cart line: a menu item reference plus the name/price snapshot
/// taken at add time. Quantity is always at least 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    #[serde(alias = "menu_item_id", alias = "itemId", alias = "id")]
    pub menu_item_id: String,
    pub name: String,
    pub price: i64,
    #[serde(default = "default_quantity", alias = "qty")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

/// Add an item: an existing line with the same menu item id gains one
/// quantity, otherwise a new line with quantity 1 is appended.
pub fn add_to_cart(cart: &[CartItem], menu_item_id: &str, name: &str, price: i64) -> Vec<CartItem> {
    let mut next = cart.to_vec();
    if let Some(line) = next.iter_mut().find(|l| l.menu_item_id == menu_item_id) {
        line.quantity += 1;
    } else {
        next.push(CartItem {
            menu_item_id: menu_item_id.to_string(),
            name: name.to_string(),
            price,
            quantity: 1,
        });
    }
    next
}

/// Remove one unit: quantity above 1 decrements, exactly 1 removes the
/// line, an absent id is a no-op.
pub fn remove_from_cart(cart: &[CartItem], menu_item_id: &str) -> Vec<CartItem> {
    let mut next = Vec::with_capacity(cart.len());
    for line in cart {
        if line.menu_item_id == menu_item_id {
            if line.quantity > 1 {
                let mut decremented = line.clone();
                decremented.quantity -= 1;
                next.push(decremented);
            }
            // quantity == 1: drop the line
        } else {
            next.push(line.clone());
        }
    }
    next
}

/// Sum of price × quantity over all lines.
pub fn subtotal(cart: &[CartItem]) -> i64 {
    cart.iter()
        .map(|l| l.price * i64::from(l.quantity))
        .sum()
}

/// Voucher discount against the subtotal.
///
/// A FREE voucher reduces nothing here; the full waiver happens at the
/// checkout layer so the percentage law (`total = subtotal × (100 − p) /
/// 100`) stays exact.
pub fn discount(subtotal: i64, voucher: Option<VoucherDiscount>) -> i64 {
    match voucher {
        Some(VoucherDiscount::Percent(pct)) => subtotal * i64::from(pct) / 100,
        Some(VoucherDiscount::Free) | None => 0,
    }
}

/// Grand total: subtotal minus discount, never negative. A FREE voucher
/// waives the whole order.
pub fn total(subtotal: i64, voucher: Option<VoucherDiscount>) -> i64 {
    if matches!(voucher, Some(VoucherDiscount::Free)) {
        return 0;
    }
    (subtotal - discount(subtotal, voucher)).max(0)
}

/// Loyalty bonus points for a checkout. Walk-ins (no registered profile)
/// never accrue points.
pub fn loyalty_bonus(total: i64, has_profile: bool) -> i64 {
    if has_profile && total >= LOYALTY_BONUS_THRESHOLD {
        LOYALTY_BONUS_POINTS
    } else {
        0
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn espresso_x2() -> Vec<CartItem> {
        vec![CartItem {
            menu_item_id: "espresso".into(),
            name: "Espresso".into(),
            price: 18_000,
            quantity: 2,
        }]
    }

    #[test]
    fn test_add_new_item_appends_with_qty_one() {
        let cart = add_to_cart(&[], "latte", "Caffe Latte", 25_000);
        assert_eq!(cart.len(), 1);
        assert_eq!(cart[0].quantity, 1);
    }

    #[test]
    fn test_add_existing_item_increments() {
        let cart = add_to_cart(&[], "latte", "Caffe Latte", 25_000);
        let cart = add_to_cart(&cart, "latte", "Caffe Latte", 25_000);
        assert_eq!(cart.len(), 1);
        assert_eq!(cart[0].quantity, 2);
    }

    #[test]
    fn test_add_then_remove_is_inverse() {
        let before = espresso_x2();
        let added = add_to_cart(&before, "espresso", "Espresso", 18_000);
        let after = remove_from_cart(&added, "espresso");
        assert_eq!(after, before);
    }

    #[test]
    fn test_remove_at_qty_one_deletes_line() {
        let cart = add_to_cart(&[], "latte", "Caffe Latte", 25_000);
        let cart = remove_from_cart(&cart, "latte");
        assert!(cart.is_empty());
    }

    #[test]
    fn test_remove_absent_id_is_noop() {
        let cart = espresso_x2();
        assert_eq!(remove_from_cart(&cart, "nonexistent"), cart);
    }

    #[test]
    fn test_subtotal_sums_lines() {
        let mut cart = espresso_x2();
        cart.push(CartItem {
            menu_item_id: "croissant".into(),
            name: "Butter Croissant".into(),
            price: 22_000,
            quantity: 1,
        });
        assert_eq!(subtotal(&cart), 2 * 18_000 + 22_000);
    }

    #[test]
    fn test_espresso_with_20_percent_voucher() {
        // [{Espresso, 18000, qty 2}], voucher 20% -> 36000 / 7200 / 28800
        let cart = espresso_x2();
        let sub = subtotal(&cart);
        assert_eq!(sub, 36_000);
        assert_eq!(discount(sub, Some(VoucherDiscount::Percent(20))), 7_200);
        assert_eq!(total(sub, Some(VoucherDiscount::Percent(20))), 28_800);
    }

    #[test]
    fn test_percentage_law_floors_to_minor_unit() {
        // subtotal 33, 10% -> discount 3 (floor of 3.3), total 30
        assert_eq!(discount(33, Some(VoucherDiscount::Percent(10))), 3);
        assert_eq!(total(33, Some(VoucherDiscount::Percent(10))), 30);
    }

    #[test]
    fn test_hundred_percent_voucher_zeroes_total() {
        assert_eq!(total(36_000, Some(VoucherDiscount::Percent(100))), 0);
    }

    #[test]
    fn test_free_voucher_waives_at_total_layer() {
        let sub = 36_000;
        assert_eq!(discount(sub, Some(VoucherDiscount::Free)), 0);
        assert_eq!(total(sub, Some(VoucherDiscount::Free)), 0);
    }

    #[test]
    fn test_no_voucher() {
        assert_eq!(discount(36_000, None), 0);
        assert_eq!(total(36_000, None), 36_000);
    }

    #[test]
    fn test_loyalty_bonus_threshold() {
        assert_eq!(loyalty_bonus(50_000, true), 10);
        assert_eq!(loyalty_bonus(49_999, true), 0);
        // Walk-ins never accrue
        assert_eq!(loyalty_bonus(120_000, false), 0);
    }
}
