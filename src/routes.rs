use std::{collections::HashMap, convert::Infallible};

use warp::{Filter, filters::path::FullPath};

use crate::{render::Renderer, resolver, store::SharedStore};

fn with_renderer(renderer: Renderer) -> impl Filter<Extract = (Renderer,), Error = Infallible> + Clone {
    warp::any().map(move || renderer.clone())
}

fn with_store(store: SharedStore) -> impl Filter<Extract = (SharedStore,), Error = Infallible> + Clone {
    warp::any().map(move || store.clone())
}

fn form_body() -> impl Filter<Extract = (HashMap<String, String>,), Error = warp::Rejection> + Clone {
    warp::body::content_length_limit(1024 * 16).and(warp::body::form())
}

fn xsrf_header() -> impl Filter<Extract = (String,), Error = warp::Rejection> + Clone {
    warp::header::optional::<String>("x-xsrf-token").map(|token: Option<String>| token.unwrap_or_default())
}

/// The slug a request path addresses: everything after the leading
/// separator, percent-decoded.
pub(crate) fn slug_from_path(path: &str) -> String {
    let raw = path.strip_prefix('/').unwrap_or(path);
    match urlencoding::decode(raw) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => raw.to_string(),
    }
}

fn home(renderer: Renderer) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::get()
        .and(warp::path::end())
        .and(with_renderer(renderer))
        .and_then(|renderer: Renderer| async move { renderer.home().await })
}

fn new_form(renderer: Renderer) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::get()
        .and(warp::path!("new"))
        .and(with_renderer(renderer))
        .and_then(|renderer: Renderer| async move { renderer.new_form().await })
}

fn create(renderer: Renderer) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::post()
        .and(warp::path!("new"))
        .and(form_body())
        .and(with_renderer(renderer))
        .and_then(|form: HashMap<String, String>, renderer: Renderer| async move { renderer.create(form).await })
}

fn detail(renderer: Renderer) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::get()
        .and(warp::path!("links" / String))
        .and(with_renderer(renderer))
        .and_then(|slug: String, renderer: Renderer| async move { renderer.detail(&slug).await })
}

fn toggle(renderer: Renderer) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::put()
        .and(warp::path!("links" / String))
        .and(xsrf_header())
        .and(with_renderer(renderer))
        .and_then(|slug: String, xsrf: String, renderer: Renderer| async move { renderer.toggle(&slug, &xsrf).await })
}

fn delete_link(renderer: Renderer) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::delete()
        .and(warp::path!("links" / String))
        .and(xsrf_header())
        .and(with_renderer(renderer))
        .and_then(|slug: String, xsrf: String, renderer: Renderer| async move { renderer.delete(&slug, &xsrf).await })
}

fn export(renderer: Renderer) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::get()
        .and(warp::path!("export"))
        .and(with_renderer(renderer))
        .and_then(|renderer: Renderer| async move { renderer.export().await })
}

// Catches every other method on the record-mutation route.
fn mutation_fallback(renderer: Renderer) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("links" / String)
        .and(with_renderer(renderer))
        .and_then(|_slug: String, renderer: Renderer| async move { renderer.method_not_allowed().await })
}

pub fn manage_routes(renderer: Renderer) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    home(renderer.clone())
        .or(new_form(renderer.clone()))
        .or(create(renderer.clone()))
        .or(export(renderer.clone()))
        .or(detail(renderer.clone()))
        .or(toggle(renderer.clone()))
        .or(delete_link(renderer.clone()))
        .or(mutation_fallback(renderer))
}

/// The director answers every path with the resolver, whatever the method.
pub fn director_routes(store: SharedStore) -> impl Filter<Extract = impl warp::Reply, Error = Infallible> + Clone {
    warp::path::full()
        .and(with_store(store))
        .and_then(|path: FullPath, store: SharedStore| async move {
            resolver::resolve(&slug_from_path(path.as_str()), store).await
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_from_path() {
        assert_eq!(slug_from_path("/promo"), "promo");
        assert_eq!(slug_from_path("/"), "");
        assert_eq!(slug_from_path("/my%2Dlink"), "my-link");
        // the remainder is kept whole, separators included
        assert_eq!(slug_from_path("/a/b"), "a/b");
    }
}
