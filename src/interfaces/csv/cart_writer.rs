use crate::domain::cart::{Cart, CartStatus};
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct CartRow<'a> {
    owner: &'a str,
    status: CartStatus,
    items: u32,
    total: String,
    tax: String,
    checkout_code: Option<&'a str>,
    transaction_code: Option<&'a str>,
}

impl<'a> From<&'a Cart> for CartRow<'a> {
    fn from(cart: &'a Cart) -> Self {
        Self {
            owner: cart.belongs_to.as_ref().map_or("", |actor| actor.id.as_str()),
            status: cart.status,
            items: cart.items.iter().map(|item| item.quantity).sum(),
            total: cart.total.to_cents_string(),
            tax: cart.tax.to_cents_string(),
            checkout_code: cart.checkout_code.as_deref(),
            transaction_code: cart.transaction_code.as_deref(),
        }
    }
}

/// Writes one summary row per cart, oldest first.
pub struct CartWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> CartWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_carts(&mut self, mut carts: Vec<Cart>) -> Result<()> {
        carts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        for cart in &carts {
            self.writer.serialize(CartRow::from(cart))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cart::Actor;
    use crate::domain::money::Money;
    use rust_decimal_macros::dec;

    #[test]
    fn test_write_carts() {
        let mut first = Cart::new(false, "/");
        first.belongs_to = Some(Actor::new("ana"));
        first.total = Money::new(dec!(20));
        first.status = CartStatus::Confirmed;
        first.checkout_code = Some("CHK-1".into());
        let mut second = Cart::new(false, "/");
        second.created_at = first
            .created_at
            .checked_add(jiff::SignedDuration::from_secs(1))
            .unwrap();

        let mut out = Vec::new();
        CartWriter::new(&mut out).write_carts(vec![second, first]).unwrap();
        let csv = String::from_utf8(out).unwrap();

        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "owner,status,items,total,tax,checkout_code,transaction_code");
        assert_eq!(lines[1], "ana,confirmed,0,20.00,0.00,CHK-1,");
        assert_eq!(lines[2], ",pending,0,0.00,0.00,,");
    }
}
