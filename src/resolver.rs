use std::convert::Infallible;

use crate::render::response;
use crate::store::SharedStore;

/// The director's redirect path. Fetches the record for `slug`, refuses
/// missing or disabled links with a plain-text 404, otherwise counts the
/// usage and redirects. The counter write is issued before the redirect
/// goes out; there is no lock around the read-modify-write, so concurrent
/// hits on one slug can drop an increment (last write wins).
pub async fn resolve(slug: &str, store: SharedStore) -> Result<Box<dyn warp::Reply>, Infallible> {
    let link = match store.get(slug).await {
        Ok(Some(link)) => link,
        Ok(None) => {
            return response("not found", warp::http::StatusCode::NOT_FOUND);
        }
        Err(e) => {
            tracing::error!("{e}");
            let reply = warp::reply::with_status(warp::reply(), warp::http::StatusCode::INTERNAL_SERVER_ERROR);
            return Ok(Box::new(reply));
        }
    };

    if !link.enabled {
        return response("not found", warp::http::StatusCode::NOT_FOUND);
    }

    let mut updated = link;
    updated.usages += 1;
    if let Err(e) = store.put(slug, &updated).await {
        tracing::error!("{e}");
        let reply = warp::reply::with_status(warp::reply(), warp::http::StatusCode::INTERNAL_SERVER_ERROR);
        return Ok(Box::new(reply));
    }

    match updated.url.parse::<warp::http::Uri>() {
        Ok(location) => Ok(Box::new(warp::redirect::found(location))),
        Err(e) => {
            // stored value is not a usable redirect target
            tracing::error!("{e}");
            let reply = warp::reply::with_status(warp::reply(), warp::http::StatusCode::INTERNAL_SERVER_ERROR);
            Ok(Box::new(reply))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use warp::reply::Reply;

    use super::*;
    use crate::model::ShortLink;
    use crate::store::{LinkStore, MemoryStore};

    #[tokio::test]
    async fn test_disabled_link_never_redirects() {
        let store = Arc::new(MemoryStore::new());
        store
            .put("promo", &ShortLink::new("https://example.com/promo", false))
            .await
            .unwrap();

        let reply = resolve("promo", store.clone()).await.unwrap();
        let response = reply.into_response();
        assert_eq!(response.status(), warp::http::StatusCode::NOT_FOUND);

        // and the counter stays untouched
        let link = store.get("promo").await.unwrap().unwrap();
        assert_eq!(link.usages, 0);
    }

    #[tokio::test]
    async fn test_sequential_resolves_count() {
        let store = Arc::new(MemoryStore::new());
        store
            .put("promo", &ShortLink::new("https://example.com/promo", true))
            .await
            .unwrap();

        for _ in 0..3 {
            let reply = resolve("promo", store.clone()).await.unwrap();
            let response = reply.into_response();
            assert_eq!(response.status(), warp::http::StatusCode::FOUND);
            assert_eq!(
                response.headers().get("Location").unwrap().to_str().unwrap(),
                "https://example.com/promo"
            );
        }

        let link = store.get("promo").await.unwrap().unwrap();
        assert_eq!(link.usages, 3);
    }

    #[tokio::test]
    async fn test_missing_slug_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let reply = resolve("nope", store).await.unwrap();
        let response = reply.into_response();
        assert_eq!(response.status(), warp::http::StatusCode::NOT_FOUND);
    }
}
