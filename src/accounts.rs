//! Account views: login, logout, registration and the profile page.
//!
//! | Method | Path | |
//! |---|---|---|
//! | GET  | `/account/login`        | login form, `next` from the query or the referrer |
//! | POST | `/account/login`        | check credentials, start a fresh session |
//! | GET  | `/account/logout`       | destroy the session |
//! | GET  | `/account/register`     | registration form |
//! | POST | `/account/register`     | create an account from the form |
//! | POST | `{api}/account/register`| create an account from JSON or form data |
//! | GET  | `/account`              | profile of the logged-in user |

use std::sync::Arc;

use http::StatusCode;
use serde::Deserialize;
use tracing::{error, info};
use url::form_urlencoded;

use crate::api::{ApiCall, ApiError, ApiRoute};
use crate::error::Error;
use crate::method::Method;
use crate::registrar::Registrar;
use crate::request::Request;
use crate::response::Response;
use crate::sessions::Context;
use crate::users::{User, UserDirectory};

/// Registers the account routes.
pub fn routes(registrar: &mut Registrar, users: Arc<dyn UserDirectory>) -> Result<(), Error> {
    let mut account = registrar.context("/account");

    account.get("/login", Some("Login"), login_form)?;
    let directory = Arc::clone(&users);
    account.post("/login", move |req: Request, ctx: Context| login(Arc::clone(&directory), req, ctx))?;

    account.get("/logout", None, logout)?;

    account.get("/register", Some("Register"), register_form)?;
    let directory = Arc::clone(&users);
    account.post("/register", move |req: Request, ctx: Context| {
        register(Arc::clone(&directory), req, ctx)
    })?;

    let route = ApiRoute::new("/register")
        .name("api_user_register")
        .methods([Method::Post])
        .split_payload(true)
        .doc("Create an account.\nTakes `email` and `password`; returns the new user.");
    account.api(route, move |call: ApiCall| api_user_register(Arc::clone(&users), call))?;

    account.get("", Some("Account"), user_profile)?;
    Ok(())
}

// ── Pages ─────────────────────────────────────────────────────────────────────

async fn login_form(req: Request, ctx: Context) -> Response {
    let next = req.param("next").or(req.referrer()).unwrap_or("/");
    let body = format!(
        r#"<form method="post" action="/account/login">
<input type="hidden" name="next" value="{next}">
<label>Email <input type="email" name="email"></label>
<label>Password <input type="password" name="password"></label>
<button type="submit">Login</button>
</form>"#,
        next = escape(next),
    );
    render(&ctx, "Login", &body)
}

async fn login(users: Arc<dyn UserDirectory>, req: Request, ctx: Context) -> Response {
    let form = req.form();
    let next = field(&form, "next").unwrap_or("/").to_owned();
    let (Some(email), Some(password)) = (field(&form, "email"), field(&form, "password")) else {
        return Response::status(StatusCode::BAD_REQUEST);
    };

    let (email, password) = (email.to_owned(), password.to_owned());
    let found = tokio::task::spawn_blocking(move || users.authenticate(&email, &password)).await;
    match found {
        Ok(Ok(Some(user))) => {
            info!(user = ?user.id, "login");
            ctx.renew_session();
            ctx.set_user(user);
            Response::redirect(&next)
        }
        Ok(Ok(None)) => {
            ctx.flash("Email or password incorrect.");
            Response::redirect(&format!("{}?next={}", req.path(), quote_plus(&next)))
        }
        Ok(Err(e)) => internal_error(&e),
        Err(e) => internal_error(&e),
    }
}

async fn logout(_req: Request, ctx: Context) -> Response {
    ctx.destroy_session();
    Response::redirect("/")
}

async fn register_form(_req: Request, ctx: Context) -> Response {
    let body = r#"<form method="post" action="/account/register">
<label>Email <input type="email" name="email"></label>
<label>Confirm email <input type="email" name="email2"></label>
<label>Password <input type="password" name="password"></label>
<label>Confirm password <input type="password" name="password2"></label>
<button type="submit">Register</button>
</form>"#;
    render(&ctx, "Register", body)
}

async fn register(users: Arc<dyn UserDirectory>, req: Request, ctx: Context) -> Response {
    let form = req.form();
    let fields = ["email", "email2", "password", "password2"].map(|key| field(&form, key));
    let [Some(email), Some(email2), Some(password), Some(password2)] = fields else {
        return Response::status(StatusCode::BAD_REQUEST);
    };

    if email != email2 {
        ctx.flash("Emails do not match");
        return Response::redirect(req.path());
    }
    if password != password2 {
        ctx.flash("Passwords do not match");
        return Response::redirect(req.path());
    }
    if users.exists(email) {
        ctx.flash("Email already registered");
        return Response::redirect(req.path());
    }

    match create(users, email, password).await {
        Ok(Some(user)) => {
            info!(user = ?user.id, "registered");
            ctx.set_user(user);
            Response::redirect("/")
        }
        Ok(None) => {
            ctx.flash("Email already registered");
            Response::redirect(req.path())
        }
        Err(response) => response,
    }
}

async fn user_profile(_req: Request, ctx: Context) -> Response {
    let user = ctx.user();
    let Some(id) = user.id else {
        return Response::redirect("/account/login");
    };
    let body = format!(
        "<dl><dt>Account</dt><dd>{id}</dd><dt>Email</dt><dd>{}</dd></dl>",
        escape(user.email.as_deref().unwrap_or("")),
    );
    render(&ctx, "Account", &body)
}

// ── API ───────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct Registration {
    email: String,
    password: String,
}

async fn api_user_register(users: Arc<dyn UserDirectory>, call: ApiCall) -> Result<User, ApiError> {
    let Registration { email, password } = call.bind()?;
    if users.exists(&email) {
        return Err(ApiError::bad_request("Email already registered"));
    }
    match create(users, &email, &password).await {
        Ok(Some(user)) => {
            info!(user = ?user.id, "registered via API");
            Ok(user)
        }
        Ok(None) => Err(ApiError::bad_request("Email already registered")),
        Err(_) => Err(ApiError::new(StatusCode::INTERNAL_SERVER_ERROR)),
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Creates an account off the async workers; bcrypt is slow.
async fn create(
    users: Arc<dyn UserDirectory>,
    email: &str,
    password: &str,
) -> Result<Option<User>, Response> {
    let (email, password) = (email.to_owned(), password.to_owned());
    match tokio::task::spawn_blocking(move || users.create(&email, &password)).await {
        Ok(Ok(created)) => Ok(created),
        Ok(Err(e)) => Err(internal_error(&e)),
        Err(e) => Err(internal_error(&e)),
    }
}

fn field<'a>(form: &'a [(String, String)], key: &str) -> Option<&'a str> {
    form.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

fn quote_plus(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

fn internal_error(e: &dyn std::fmt::Display) -> Response {
    error!("account view failed: {e}");
    Response::status(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Wraps `body` in the site layout: account menu and pending flashes.
fn render(ctx: &Context, title: &str, body: &str) -> Response {
    let nav: String = ctx.account_links().iter()
        .map(|link| format!(r#"<a href="{}">{}</a>"#, escape(&link.href), escape(&link.title)))
        .collect::<Vec<_>>()
        .join(" | ");
    let flashes: String = ctx.take_flashes().iter()
        .map(|message| format!(r#"<p class="flash">{}</p>"#, escape(message)))
        .collect();
    Response::html(format!(
        "<!doctype html>\n<html><head><title>{title}</title></head>\n<body>\n<nav>{nav}</nav>\n{flashes}\n<h1>{title}</h1>\n{body}\n</body></html>\n",
        title = escape(title),
    ))
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
