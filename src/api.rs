// src/api.rs
use crate::auth::{hash_password, verify_password, Identity, SessionKeys};
use crate::error::{AppError, StoreError};
use crate::gateway::MarketData;
use crate::intraday::{build_report, InvestorClass};
use crate::models::{NewUser, StockForm, USERNAME_MAX_LEN};
use crate::portfolio::{require_admin, Portfolio, PortfolioError};
use crate::store::UserStore;
use crate::views::{self, Flash, Page};
use log::{error, info, warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use warp::http::header::{HeaderValue, SET_COOKIE};
use warp::http::{StatusCode, Uri};
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

const SESSION_COOKIE: &str = "session";
const FLASH_COOKIE: &str = "flash";
const FORM_LIMIT: u64 = 16 * 1024;
const LOGIN_FAILED: &str = "Login Unsuccessful. Please check username and password";

/// Settings the handlers need from the configuration.
pub struct Settings {
    pub assets_root: String,
    pub allow_admin_signup: bool,
    pub intraday_page_size: u32,
}

#[derive(Clone)]
pub struct AppState {
    pub portfolio: Arc<Portfolio>,
    pub users: Arc<dyn UserStore>,
    pub market: Arc<dyn MarketData>,
    pub keys: Arc<SessionKeys>,
    pub settings: Arc<Settings>,
}

/// Who is asking, plus any pending flash message.
pub struct RequestContext {
    identity: Option<Identity>,
    flash: Option<Flash>,
}

impl RequestContext {
    fn page<'a>(&'a self, settings: &'a Settings, extra: Option<Flash>) -> Page<'a> {
        Page {
            assets_root: &settings.assets_root,
            identity: self.identity.as_ref(),
            flashes: self.flash.iter().cloned().chain(extra).collect(),
        }
    }
}

#[derive(Deserialize)]
struct LoginForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[derive(Deserialize)]
struct RegisterForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    is_admin: Option<String>,
}

#[derive(Deserialize)]
struct IntradayForm {
    #[serde(default)]
    symbol: String,
    sheep: Option<String>,
    wolf: Option<String>,
    shark: Option<String>,
}

impl IntradayForm {
    fn classes(&self) -> Vec<InvestorClass> {
        [
            (InvestorClass::Sheep, &self.sheep),
            (InvestorClass::Wolf, &self.wolf),
            (InvestorClass::Shark, &self.shark),
        ]
        .iter()
        .filter(|(_, flag)| flag.is_some())
        .map(|(class, _)| *class)
        .collect()
    }
}

pub fn routes(
    state: AppState,
    static_dir: PathBuf,
) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    let index = warp::path::end()
        .and(warp::get())
        .and(with_state(state.clone()))
        .and(with_context(state.clone()))
        .and_then(index_handler);

    let login_page = warp::path!("login")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and(with_context(state.clone()))
        .and_then(login_page_handler);

    let login = warp::path!("login")
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(with_context(state.clone()))
        .and(form_body())
        .and_then(login_handler);

    let register_page = warp::path!("register")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and(with_context(state.clone()))
        .and_then(register_page_handler);

    let register = warp::path!("register")
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(with_context(state.clone()))
        .and(form_body())
        .and_then(register_handler);

    let logout = warp::path!("logout")
        .and(warp::get())
        .and(with_context(state.clone()))
        .and_then(logout_handler);

    let add_page = warp::path!("add")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and(with_context(state.clone()))
        .and_then(add_page_handler);

    let add = warp::path!("add")
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(with_context(state.clone()))
        .and(form_body())
        .and_then(add_handler);

    let edit_page = warp::path!("edit" / i64)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and(with_context(state.clone()))
        .and_then(edit_page_handler);

    let edit = warp::path!("edit" / i64)
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(with_context(state.clone()))
        .and(form_body())
        .and_then(edit_handler);

    let delete = warp::path!("delete" / i64)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and(with_context(state.clone()))
        .and_then(delete_handler);

    let intraday_page = warp::path!("intraday_data")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and(with_context(state.clone()))
        .and_then(intraday_page_handler);

    let intraday = warp::path!("intraday_data")
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(with_context(state.clone()))
        .and(form_body())
        .and_then(intraday_handler);

    let assets = warp::path("static").and(warp::fs::dir(static_dir));
    let assets_root = state.settings.assets_root.clone();

    index
        .or(login_page)
        .or(login)
        .or(register_page)
        .or(register)
        .or(logout)
        .or(add_page)
        .or(add)
        .or(edit_page)
        .or(edit)
        .or(delete)
        .or(intraday_page)
        .or(intraday)
        .or(assets)
        .recover(move |err: Rejection| handle_rejection(err, assets_root.clone()))
}

fn with_state(
    state: AppState,
) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn with_context(
    state: AppState,
) -> impl Filter<Extract = (RequestContext,), Error = Rejection> + Clone {
    with_state(state)
        .and(warp::cookie::optional(SESSION_COOKIE))
        .and(warp::cookie::optional(FLASH_COOKIE))
        .and_then(resolve_context)
}

fn form_body<T: DeserializeOwned + Send + 'static>(
) -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(FORM_LIMIT).and(warp::body::form())
}

/// Loads the session user fresh from the store so admin changes apply at once.
async fn resolve_context(
    state: AppState,
    session: Option<String>,
    flash: Option<String>,
) -> Result<RequestContext, Rejection> {
    let identity = match session.and_then(|token| state.keys.verify_token(&token)) {
        Some(username) => match state.users.find_user(&username).await {
            Ok(user) => user.as_ref().map(Identity::from),
            Err(e) => {
                error!("Failed to load user {}: {}", username, e);
                return Err(warp::reject::custom(AppError::from(e)));
            }
        },
        None => None,
    };
    Ok(RequestContext {
        identity,
        flash: flash.and_then(|raw| Flash::decode(&raw)),
    })
}

async fn index_handler(state: AppState, ctx: RequestContext) -> Result<Response, Rejection> {
    let rows = state.portfolio.listing().await.map_err(|e| {
        error!("Failed to list stocks: {}", e);
        warp::reject::custom(AppError::from(e))
    })?;
    let body = views::index(&ctx.page(&state.settings, None), &rows);
    Ok(html(body, StatusCode::OK, &ctx))
}

async fn login_page_handler(state: AppState, ctx: RequestContext) -> Result<Response, Rejection> {
    let body = views::login(&ctx.page(&state.settings, None));
    Ok(html(body, StatusCode::OK, &ctx))
}

async fn login_handler(
    state: AppState,
    ctx: RequestContext,
    form: LoginForm,
) -> Result<Response, Rejection> {
    let username = form.username.trim();
    let user = state
        .users
        .find_user(username)
        .await
        .map_err(|e| warp::reject::custom(AppError::from(e)))?;

    match user {
        Some(user) if verify_password(&form.password, &user.password_hash) => {
            let token = state
                .keys
                .create_token(&user.username)
                .map_err(|e| warp::reject::custom(AppError::Internal(e.to_string())))?;
            info!("{} logged in", user.username);
            let mut res = redirect(Uri::from_static("/"), None);
            append_cookie(
                &mut res,
                format!(
                    "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
                    SESSION_COOKIE,
                    token,
                    state.keys.ttl_secs()
                ),
            );
            Ok(res)
        }
        _ => {
            warn!("Failed login for {:?}", username);
            let body = views::login(&ctx.page(&state.settings, Some(Flash::danger(LOGIN_FAILED))));
            Ok(html(body, StatusCode::OK, &ctx))
        }
    }
}

async fn register_page_handler(
    state: AppState,
    ctx: RequestContext,
) -> Result<Response, Rejection> {
    let body = views::register(
        &ctx.page(&state.settings, None),
        state.settings.allow_admin_signup,
    );
    Ok(html(body, StatusCode::OK, &ctx))
}

async fn register_handler(
    state: AppState,
    ctx: RequestContext,
    form: RegisterForm,
) -> Result<Response, Rejection> {
    let username = form.username.trim().to_string();
    let problem = if username.is_empty() || form.password.is_empty() {
        Some("Username and password are required".to_string())
    } else if username.chars().count() > USERNAME_MAX_LEN {
        Some(format!(
            "Username must be at most {} characters",
            USERNAME_MAX_LEN
        ))
    } else {
        None
    };

    let problem = match problem {
        Some(problem) => Some(problem),
        None => {
            let password_hash = hash_password(&form.password)
                .map_err(|e| warp::reject::custom(AppError::Internal(e.to_string())))?;
            let user = NewUser {
                username,
                password_hash,
                is_admin: state.settings.allow_admin_signup
                    && form.is_admin.as_deref() == Some("on"),
            };
            match state.users.create_user(user).await {
                Ok(_) => {
                    return Ok(redirect(
                        Uri::from_static("/login"),
                        Some(Flash::success("Your account has been created!")),
                    ))
                }
                Err(StoreError::DuplicateUser(name)) => {
                    Some(format!("Username {} is already taken", name))
                }
                Err(e) => {
                    error!("Failed to register user: {}", e);
                    return Err(warp::reject::custom(AppError::from(e)));
                }
            }
        }
    };

    let body = views::register(
        &ctx.page(&state.settings, problem.map(Flash::danger)),
        state.settings.allow_admin_signup,
    );
    Ok(html(body, StatusCode::OK, &ctx))
}

async fn logout_handler(ctx: RequestContext) -> Result<Response, Rejection> {
    if let Some(identity) = &ctx.identity {
        info!("{} logged out", identity.username);
    }
    let mut res = redirect(Uri::from_static("/"), None);
    append_cookie(&mut res, expired_cookie(SESSION_COOKIE));
    Ok(res)
}

async fn add_page_handler(state: AppState, ctx: RequestContext) -> Result<Response, Rejection> {
    let identity = match &ctx.identity {
        Some(identity) => identity,
        None => return Ok(login_redirect()),
    };
    if let Err(e) = require_admin(identity) {
        return portfolio_failure(e);
    }
    let body = views::stock_form(&ctx.page(&state.settings, None), None, &StockForm::default());
    Ok(html(body, StatusCode::OK, &ctx))
}

async fn add_handler(
    state: AppState,
    ctx: RequestContext,
    form: StockForm,
) -> Result<Response, Rejection> {
    let identity = match &ctx.identity {
        Some(identity) => identity,
        None => return Ok(login_redirect()),
    };
    if let Err(e) = require_admin(identity) {
        return portfolio_failure(e);
    }
    let input = match form.validate() {
        Ok(input) => input,
        Err(e) => {
            let page = ctx.page(&state.settings, Some(Flash::danger(e.to_string())));
            return Ok(html(views::stock_form(&page, None, &form), StatusCode::OK, &ctx));
        }
    };

    match state.portfolio.add(identity, input).await {
        Ok(_) => Ok(redirect(
            Uri::from_static("/"),
            Some(Flash::success("Stock added successfully!")),
        )),
        Err(e @ PortfolioError::NotTradable(_)) => {
            let page = ctx.page(&state.settings, Some(Flash::danger(e.to_string())));
            Ok(html(views::stock_form(&page, None, &form), StatusCode::OK, &ctx))
        }
        Err(e) => portfolio_failure(e),
    }
}

async fn edit_page_handler(
    id: i64,
    state: AppState,
    ctx: RequestContext,
) -> Result<Response, Rejection> {
    let identity = match &ctx.identity {
        Some(identity) => identity,
        None => return Ok(login_redirect()),
    };
    match state.portfolio.entry(identity, id).await {
        Ok(entry) => {
            let page = ctx.page(&state.settings, None);
            let body = views::stock_form(&page, Some(id), &StockForm::from(&entry));
            Ok(html(body, StatusCode::OK, &ctx))
        }
        Err(e) => portfolio_failure(e),
    }
}

async fn edit_handler(
    id: i64,
    state: AppState,
    ctx: RequestContext,
    form: StockForm,
) -> Result<Response, Rejection> {
    let identity = match &ctx.identity {
        Some(identity) => identity,
        None => return Ok(login_redirect()),
    };
    if let Err(e) = state.portfolio.entry(identity, id).await {
        return portfolio_failure(e);
    }
    let input = match form.validate() {
        Ok(input) => input,
        Err(e) => {
            let page = ctx.page(&state.settings, Some(Flash::danger(e.to_string())));
            return Ok(html(
                views::stock_form(&page, Some(id), &form),
                StatusCode::OK,
                &ctx,
            ));
        }
    };

    match state.portfolio.edit(identity, id, input).await {
        Ok(()) => Ok(redirect(
            Uri::from_static("/"),
            Some(Flash::success("Stock updated successfully!")),
        )),
        Err(e) => portfolio_failure(e),
    }
}

async fn delete_handler(
    id: i64,
    state: AppState,
    ctx: RequestContext,
) -> Result<Response, Rejection> {
    let identity = match &ctx.identity {
        Some(identity) => identity,
        None => return Ok(login_redirect()),
    };
    match state.portfolio.remove(identity, id).await {
        Ok(()) => Ok(redirect(
            Uri::from_static("/"),
            Some(Flash::success("Stock deleted successfully!")),
        )),
        Err(e) => portfolio_failure(e),
    }
}

async fn intraday_page_handler(
    state: AppState,
    ctx: RequestContext,
) -> Result<Response, Rejection> {
    let body = views::intraday(&ctx.page(&state.settings, None), None, None);
    Ok(html(body, StatusCode::OK, &ctx))
}

async fn intraday_handler(
    state: AppState,
    ctx: RequestContext,
    form: IntradayForm,
) -> Result<Response, Rejection> {
    let symbol = form.symbol.trim().to_uppercase();
    if symbol.is_empty() {
        let page = ctx.page(&state.settings, Some(Flash::danger("symbol is required")));
        return Ok(html(views::intraday(&page, None, None), StatusCode::OK, &ctx));
    }

    match state
        .market
        .intraday_trades(&symbol, state.settings.intraday_page_size)
        .await
    {
        Ok(trades) => {
            let report = build_report(&symbol, trades, &form.classes());
            info!(
                "Intraday report for {}: {} of {} trades",
                symbol,
                report.details.len(),
                report.total_trades
            );
            let page = ctx.page(&state.settings, None);
            let body = views::intraday(&page, Some(&symbol), Some(&report));
            Ok(html(body, StatusCode::OK, &ctx))
        }
        Err(e) => {
            warn!("Error fetching intraday data for {}: {}", symbol, e);
            let page = ctx.page(
                &state.settings,
                Some(Flash::danger(format!("No intraday data for {}: {}", symbol, e))),
            );
            Ok(html(
                views::intraday(&page, Some(&symbol), None),
                StatusCode::OK,
                &ctx,
            ))
        }
    }
}

/// Authorization failures become redirects; missing entries end the request.
fn portfolio_failure(e: PortfolioError) -> Result<Response, Rejection> {
    match e {
        PortfolioError::Forbidden | PortfolioError::NotTradable(_) => Ok(redirect(
            Uri::from_static("/"),
            Some(Flash::danger(e.to_string())),
        )),
        PortfolioError::Store(e) => {
            if !matches!(e, StoreError::NotFound(_)) {
                error!("Store failure: {}", e);
            }
            Err(warp::reject::custom(AppError::from(e)))
        }
    }
}

fn login_redirect() -> Response {
    redirect(
        Uri::from_static("/login"),
        Some(Flash::danger("Please log in to access this page.")),
    )
}

fn redirect(to: Uri, flash: Option<Flash>) -> Response {
    let mut res = warp::redirect::see_other(to).into_response();
    if let Some(flash) = flash {
        append_cookie(
            &mut res,
            format!(
                "{}={}; Path=/; HttpOnly; SameSite=Lax",
                FLASH_COOKIE,
                flash.encode()
            ),
        );
    }
    res
}

/// Renders a page, clearing the flash cookie it just displayed.
fn html(body: String, status: StatusCode, ctx: &RequestContext) -> Response {
    let mut res = warp::reply::with_status(warp::reply::html(body), status).into_response();
    if ctx.flash.is_some() {
        append_cookie(&mut res, expired_cookie(FLASH_COOKIE));
    }
    res
}

fn expired_cookie(name: &str) -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", name)
}

fn append_cookie(res: &mut Response, cookie: String) {
    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            res.headers_mut().append(SET_COOKIE, value);
        }
        Err(e) => error!("Dropping invalid cookie header: {}", e),
    }
}

pub async fn handle_rejection(
    err: Rejection,
    assets_root: String,
) -> Result<impl Reply, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "The requested page does not exist.".to_string())
    } else if let Some(app) = err.find::<AppError>() {
        match app {
            AppError::NotFound => (StatusCode::NOT_FOUND, "No such stock entry.".to_string()),
            AppError::Internal(msg) => {
                error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Something went wrong.".to_string(),
                )
            }
        }
    } else if let Some(e) = err.find::<warp::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Form too large.".to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed.".to_string())
    } else {
        error!("Unhandled rejection: {:?}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Something went wrong.".to_string(),
        )
    };

    let page = Page {
        assets_root: &assets_root,
        identity: None,
        flashes: Vec::new(),
    };
    let title = status.canonical_reason().unwrap_or("Error");
    Ok(warp::reply::with_status(
        warp::reply::html(views::error_page(&page, title, &message)),
        status,
    ))
}
