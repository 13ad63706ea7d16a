//! Resolution of the delivery address for a checkout.

use store::Transaction;

use crate::{Caller, DomainError};

use super::{CheckoutRequest, DeliveryAddress, NewAddress, OrderError};

/// Turns a checkout's address reference into a delivery address value.
pub struct AddressResolver;

impl AddressResolver {
    /// Resolves the address of a validated request.
    ///
    /// A saved address is looked up in the caller's address book as read
    /// through `tx`, never from a copy cached alongside the caller. An inline
    /// address is copied as is and not added to any address book.
    pub async fn resolve<T: Transaction>(
        tx: &mut T,
        request: &CheckoutRequest,
        caller: &Caller,
    ) -> Result<DeliveryAddress, DomainError> {
        if let Some(address) = &request.new_address {
            return Ok(Self::from_new(address));
        }

        let Some(address_id) = request.address_id else {
            return Err(OrderError::Validation(
                "A saved address or a new address is required".to_string(),
            )
            .into());
        };
        let Some(user_id) = caller.user_id() else {
            return Err(OrderError::Validation(
                "A saved address can only be used by a signed-in user".to_string(),
            )
            .into());
        };

        let saved = tx.user_addresses(user_id).await?;
        saved
            .iter()
            .find(|a| a.id == address_id)
            .map(DeliveryAddress::from)
            .ok_or_else(|| {
                tracing::debug!(%user_id, %address_id, "saved address not found");
                OrderError::ResourceNotFound {
                    resource: "address",
                    id: address_id.to_string(),
                }
                .into()
            })
    }

    fn from_new(address: &NewAddress) -> DeliveryAddress {
        DeliveryAddress {
            full_address: address.full_address.clone(),
            city: address.city.clone(),
            district: address.district.clone(),
            postal_code: address.postal_code.clone(),
            recipient_name: address.recipient_name.clone(),
            phone_number: address.phone_number.clone(),
            title: address.address_title.clone(),
            email: address.email.as_ref().map(|e| e.trim().to_string()),
        }
    }
}
