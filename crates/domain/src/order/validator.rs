//! Structural and business checks run before any checkout mutation.

use std::collections::HashSet;

use crate::Caller;

use super::{CheckoutRequest, OrderError};

/// Longest accepted order note, in characters.
pub const MAX_NOTES_CHARS: usize = 500;

/// Accepted quantity range for one line.
pub const QUANTITY_RANGE: std::ops::RangeInclusive<i32> = 1..=100;

/// Validates checkout requests.
///
/// Validation is pure: it reads nothing and writes nothing, so a rejected
/// request can be retried freely once corrected.
pub struct OrderValidator;

impl OrderValidator {
    /// Runs every check in order and reports the first failure.
    pub fn validate(request: &CheckoutRequest, caller: &Caller) -> Result<(), OrderError> {
        Self::check_items(request)?;
        Self::check_address_source(request)?;
        Self::check_saved_address_owner(request, caller)?;
        Self::check_guest_contact(request, caller)?;
        Self::check_payment_method(request)?;
        Self::check_notes(request)
    }

    fn check_items(request: &CheckoutRequest) -> Result<(), OrderError> {
        if request.items.is_empty() {
            return Err(invalid("Order must contain at least one item"));
        }

        let mut seen = HashSet::with_capacity(request.items.len());
        for item in &request.items {
            if !item.product_id.is_valid() {
                return Err(invalid(format!(
                    "Product id must be positive, got {}",
                    item.product_id
                )));
            }
            if !QUANTITY_RANGE.contains(&item.quantity) {
                return Err(invalid(format!(
                    "Quantity for product {} must be between {} and {}, got {}",
                    item.product_id,
                    QUANTITY_RANGE.start(),
                    QUANTITY_RANGE.end(),
                    item.quantity
                )));
            }
            if !seen.insert(item.product_id) {
                return Err(invalid(format!(
                    "Product {} appears more than once",
                    item.product_id
                )));
            }
        }
        Ok(())
    }

    fn check_address_source(request: &CheckoutRequest) -> Result<(), OrderError> {
        match (&request.address_id, &request.new_address) {
            (Some(_), Some(_)) => Err(invalid(
                "Provide either a saved address or a new address, not both",
            )),
            (None, None) => Err(invalid("A saved address or a new address is required")),
            _ => Ok(()),
        }
    }

    fn check_saved_address_owner(
        request: &CheckoutRequest,
        caller: &Caller,
    ) -> Result<(), OrderError> {
        if request.address_id.is_some() && !caller.is_authenticated() {
            return Err(invalid("A saved address can only be used by a signed-in user"));
        }
        Ok(())
    }

    fn check_guest_contact(request: &CheckoutRequest, caller: &Caller) -> Result<(), OrderError> {
        if caller.is_authenticated() {
            return Ok(());
        }

        let Some(address) = &request.new_address else {
            return Err(invalid("Guest orders require a new address"));
        };
        if is_blank(address.email.as_deref()) {
            return Err(invalid("Guest orders require an email"));
        }
        if is_blank(Some(&address.recipient_name)) {
            return Err(invalid("Guest orders require a recipient name"));
        }
        if is_blank(Some(&address.phone_number)) {
            return Err(invalid("Guest orders require a phone number"));
        }
        Ok(())
    }

    fn check_payment_method(request: &CheckoutRequest) -> Result<(), OrderError> {
        if request.payment_method.is_none() {
            return Err(invalid("Payment method is required"));
        }
        Ok(())
    }

    fn check_notes(request: &CheckoutRequest) -> Result<(), OrderError> {
        let length = request.notes.as_deref().map_or(0, |n| n.chars().count());
        if length > MAX_NOTES_CHARS {
            return Err(invalid(format!(
                "Notes must be at most {MAX_NOTES_CHARS} characters, got {length}"
            )));
        }
        Ok(())
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

fn invalid(message: impl Into<String>) -> OrderError {
    OrderError::Validation(message.into())
}
