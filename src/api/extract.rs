//! Request extractors: the caller's identity and the client-held guest cart.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, HeaderValue},
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

use super::error::ApiError;
use super::AppState;
use crate::domain::aggregates::Cart;
use crate::identity::Identity;

/// Header carrying an anonymous visitor's cart as base64url(JSON).
pub const GUEST_CART_HEADER: &str = "x-guest-cart";

/// The resolved caller. A missing, malformed or unknown bearer credential
/// yields [`Identity::ANONYMOUS`].
#[derive(Clone, Copy, Debug)]
pub struct CallerIdentity(pub Identity);

#[async_trait]
impl FromRequestParts<AppState> for CallerIdentity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(identity) = parts.extensions.get::<Identity>() {
            return Ok(Self(*identity));
        }

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty());

        let identity = match token {
            Some(token) => state.identities.resolve(token).await?.unwrap_or_else(|| {
                tracing::debug!(uri = %parts.uri, "unknown credential, treating caller as anonymous");
                Identity::ANONYMOUS
            }),
            None => Identity::ANONYMOUS,
        };
        parts.extensions.insert(identity);
        Ok(Self(identity))
    }
}

/// The guest cart presented by the client, if any. An undecodable header is
/// treated as absent so a stale client never locks itself out of its cart.
#[derive(Clone, Debug, Default)]
pub struct GuestCart(pub Option<Cart>);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for GuestCart {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(raw) = parts.headers.get(GUEST_CART_HEADER) else { return Ok(Self(None)) };
        let cart = raw.to_str().ok().and_then(decode_guest_cart);
        if cart.is_none() {
            tracing::debug!("ignoring undecodable guest cart header");
        }
        Ok(Self(cart))
    }
}

pub fn decode_guest_cart(raw: &str) -> Option<Cart> {
    let bytes = URL_SAFE_NO_PAD.decode(raw.trim()).ok()?;
    serde_json::from_slice(&bytes).ok()
}

pub fn encode_guest_cart(cart: &Cart) -> Option<String> {
    serde_json::to_vec(cart).ok().map(|json| URL_SAFE_NO_PAD.encode(json))
}

/// Response headers handing the updated guest cart back to the client.
pub fn guest_cart_headers(cart: &Cart) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Some(value) = encode_guest_cart(cart).and_then(|v| HeaderValue::from_str(&v).ok()) {
        headers.insert(GUEST_CART_HEADER, value);
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::cart::tests::draft;
    use crate::domain::value_objects::ProductId;

    #[test]
    fn test_guest_cart_header_codec() {
        let mut cart = Cart::anonymous();
        cart.add_line(draft(ProductId::generate(), 3, 250)).unwrap();

        let encoded = encode_guest_cart(&cart).unwrap();
        assert!(HeaderValue::from_str(&encoded).is_ok());
        let decoded = decode_guest_cart(&encoded).unwrap();
        assert_eq!(decoded.id(), cart.id());
        assert_eq!(decoded.total_items(), 3);
        assert_eq!(decoded.total_price(), cart.total_price());

        assert!(decode_guest_cart("not base64 at all!").is_none());
        assert!(decode_guest_cart(&URL_SAFE_NO_PAD.encode(b"{\"lines\": 4}")).is_none());
    }
}
