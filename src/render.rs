use std::{
    convert::Infallible,
    io::{BufWriter, Write},
};

use csrf::{AesGcmCsrfProtection, CsrfProtection};
use handlebars::Handlebars;
use rand::Rng;

use crate::model::{self, FormErrors, FormValues, LinkExport, ShortLink, Validated};
use crate::store::SharedStore;

struct Message {
    msg: String,
}

impl Message {
    fn new(message: &str) -> Self {
        Self {
            msg: message.to_string(),
        }
    }
}

impl warp::Reply for Message {
    fn into_response(self) -> warp::reply::Response {
        warp::reply::Response::new(self.msg.to_string().into())
    }
}

pub(crate) fn response(message: &str, status: warp::http::StatusCode) -> Result<Box<dyn warp::Reply>, Infallible> {
    Ok(Box::new(warp::reply::with_status(Message::new(message), status)))
}

fn redirect(location: &str) -> Result<Box<dyn warp::Reply>, Infallible> {
    Ok(Box::new(warp::reply::with_header(
        warp::redirect::found(location.parse::<warp::http::Uri>().unwrap()),
        "Cache-Control",
        "no-cache",
    )))
}

/// Registers the management page templates out of `templates_dir`.
pub fn register_templates(templates_dir: &str) -> Result<Handlebars<'static>, handlebars::TemplateError> {
    let mut handlebars = Handlebars::new();
    for name in ["base", "home", "new", "detail"] {
        handlebars.register_template_file(name, format!("{}/{}.hbs", templates_dir, name))?;
    }
    Ok(handlebars)
}

/// The management app: list, create, detail, toggle, delete, export.
/// Holds the record store, the template registry, and a per-process CSRF
/// token checked on every mutation.
#[derive(Clone, Debug)]
pub struct Renderer {
    domain: String,
    new_links_enabled: bool,
    csrf_token: csrf::CsrfToken,
    pub(crate) store: SharedStore,
    pub(crate) handlebars: Handlebars<'static>,
}

impl Renderer {
    pub fn new(domain: &str, new_links_enabled: bool, store: SharedStore, handlebars: Handlebars<'static>) -> Self {
        let mut secret_key = [0u8; 32];
        rand::rng().fill_bytes(&mut secret_key);
        let protect = AesGcmCsrfProtection::from_key(secret_key);

        let mut nonce = [0u8; 64];
        rand::rng().fill_bytes(&mut nonce);
        let csrf_token: csrf::CsrfToken = protect.generate_token(&nonce).unwrap();

        Self {
            domain: domain.to_string(),
            new_links_enabled,
            csrf_token,
            store,
            handlebars,
        }
    }

    pub fn xsrf(&self) -> String {
        self.csrf_token.b64_string()
    }

    /// All slugs in the store. An empty namespace renders the empty state,
    /// not an error.
    pub async fn home(&self) -> Result<Box<dyn warp::Reply>, Infallible> {
        match self.store.list_keys().await {
            Ok(slugs) => {
                match self
                    .handlebars
                    .render("home", &serde_json::json!({"domain": self.domain, "links": slugs}))
                {
                    Ok(page) => Ok(Box::new(warp::reply::html(page))),
                    Err(e) => {
                        tracing::error!("{e}");
                        let reply =
                            warp::reply::with_status(warp::reply(), warp::http::StatusCode::INTERNAL_SERVER_ERROR);
                        Ok(Box::new(reply))
                    }
                }
            }
            Err(e) => {
                tracing::error!("{e}");
                let reply = warp::reply::with_status(warp::reply(), warp::http::StatusCode::INTERNAL_SERVER_ERROR);
                Ok(Box::new(reply))
            }
        }
    }

    pub async fn new_form(&self) -> Result<Box<dyn warp::Reply>, Infallible> {
        self.render_new(None, &FormValues::default())
    }

    fn render_new(&self, errors: Option<&FormErrors>, values: &FormValues) -> Result<Box<dyn warp::Reply>, Infallible> {
        match self.handlebars.render(
            "new",
            &serde_json::json!({"domain": self.domain, "errors": errors, "values": values, "XSRF": self.xsrf()}),
        ) {
            Ok(page) => Ok(Box::new(warp::reply::html(page))),
            Err(e) => {
                tracing::error!("{e}");
                let reply = warp::reply::with_status(warp::reply(), warp::http::StatusCode::INTERNAL_SERVER_ERROR);
                Ok(Box::new(reply))
            }
        }
    }

    /// Create submission. Validation runs before any store write; on
    /// failure the form re-renders with the field errors and the submitted
    /// values. A valid slug is written blindly, overwriting any record
    /// already under it.
    pub async fn create(
        &self,
        form: std::collections::HashMap<String, String>,
    ) -> Result<Box<dyn warp::Reply>, Infallible> {
        let xsrf = form.get("_xsrf").cloned().unwrap_or_default();
        if xsrf != self.xsrf() {
            return redirect("/");
        }

        match model::validate_form(&form) {
            Validated::Invalid { errors, values } => self.render_new(Some(&errors), &values),
            Validated::Valid(values) => {
                let link = ShortLink::new(&values.url, self.new_links_enabled);
                tracing::debug!("creating new link {}: {}", &values.slug, &link);
                match self.store.put(&values.slug, &link).await {
                    Ok(()) => redirect(&format!("/links/{}", values.slug)),
                    Err(e) => {
                        tracing::error!("{e}");
                        let reply =
                            warp::reply::with_status(warp::reply(), warp::http::StatusCode::INTERNAL_SERVER_ERROR);
                        Ok(Box::new(reply))
                    }
                }
            }
        }
    }

    pub async fn detail(&self, slug: &str) -> Result<Box<dyn warp::Reply>, Infallible> {
        match self.store.get(slug).await {
            Ok(Some(link)) => {
                match self.handlebars.render(
                    "detail",
                    &serde_json::json!({"domain": self.domain, "slug": slug, "link": link, "XSRF": self.xsrf()}),
                ) {
                    Ok(page) => Ok(Box::new(warp::reply::html(page))),
                    Err(e) => {
                        tracing::error!("{e}");
                        let reply =
                            warp::reply::with_status(warp::reply(), warp::http::StatusCode::INTERNAL_SERVER_ERROR);
                        Ok(Box::new(reply))
                    }
                }
            }
            Ok(None) => response("not found", warp::http::StatusCode::NOT_FOUND),
            Err(e) => {
                tracing::error!("{e}");
                let reply = warp::reply::with_status(warp::reply(), warp::http::StatusCode::INTERNAL_SERVER_ERROR);
                Ok(Box::new(reply))
            }
        }
    }

    /// Flips `enabled` and writes the full record back. An absent slug is
    /// left alone; the redirect back to the detail view happens either way.
    pub async fn toggle(&self, slug: &str, xsrf: &str) -> Result<Box<dyn warp::Reply>, Infallible> {
        if xsrf != self.xsrf() {
            return redirect("/");
        }

        match self.store.get(slug).await {
            Ok(Some(mut link)) => {
                link.enabled = !link.enabled;
                match self.store.put(slug, &link).await {
                    Ok(()) => redirect(&format!("/links/{}", slug)),
                    Err(e) => {
                        tracing::error!("{e}");
                        let reply =
                            warp::reply::with_status(warp::reply(), warp::http::StatusCode::INTERNAL_SERVER_ERROR);
                        Ok(Box::new(reply))
                    }
                }
            }
            Ok(None) => redirect(&format!("/links/{}", slug)),
            Err(e) => {
                tracing::error!("{e}");
                let reply = warp::reply::with_status(warp::reply(), warp::http::StatusCode::INTERNAL_SERVER_ERROR);
                Ok(Box::new(reply))
            }
        }
    }

    /// Removes the slug unconditionally. Deleting an absent slug is fine.
    pub async fn delete(&self, slug: &str, xsrf: &str) -> Result<Box<dyn warp::Reply>, Infallible> {
        if xsrf != self.xsrf() {
            return redirect("/");
        }

        match self.store.delete(slug).await {
            Ok(()) => redirect("/"),
            Err(e) => {
                tracing::error!("{e}");
                let reply = warp::reply::with_status(warp::reply(), warp::http::StatusCode::INTERNAL_SERVER_ERROR);
                Ok(Box::new(reply))
            }
        }
    }

    /// Dumps every record as NDJSON, one `{slug, url, enabled, usages}`
    /// object per line.
    pub async fn export(&self) -> Result<Box<dyn warp::Reply>, Infallible> {
        use serde_jsonlines::WriteExt;

        let slugs = match self.store.list_keys().await {
            Ok(slugs) => slugs,
            Err(e) => {
                tracing::error!("{e}");
                let reply = warp::reply::with_status(warp::reply(), warp::http::StatusCode::INTERNAL_SERVER_ERROR);
                return Ok(Box::new(reply));
            }
        };

        let mut exports: Vec<LinkExport> = Vec::new();
        for slug in slugs {
            match self.store.get(&slug).await {
                Ok(Some(link)) => exports.push(LinkExport {
                    slug,
                    url: link.url,
                    enabled: link.enabled,
                    usages: link.usages,
                }),
                // deleted between enumeration and read
                Ok(None) => {}
                Err(e) => {
                    tracing::error!("{e}");
                    let reply = warp::reply::with_status(warp::reply(), warp::http::StatusCode::INTERNAL_SERVER_ERROR);
                    return Ok(Box::new(reply));
                }
            }
        }

        let buffer = Vec::new();
        let mut writer = BufWriter::new(buffer);
        writer.write_json_lines(exports).unwrap();
        writer.flush().expect("Unable to flush writer");
        let inner_buffer = writer.into_inner().unwrap();
        let result_string = String::from_utf8(inner_buffer).expect("Buffer content was not valid UTF-8");
        Ok(Box::new(warp::reply::with_status(
            warp::reply::with_header(warp::reply::html(result_string), "Content-Type", "application/x-ndjson"),
            warp::http::StatusCode::OK,
        )))
    }

    pub async fn method_not_allowed(&self) -> Result<Box<dyn warp::Reply>, Infallible> {
        Ok(Box::new(warp::reply::with_status(
            warp::reply::json(&serde_json::json!({"message": "method not allowed"})),
            warp::http::StatusCode::METHOD_NOT_ALLOWED,
        )))
    }
}
