// src/views.rs
use crate::auth::Identity;
use crate::intraday::{InvestorClass, IntradayReport};
use crate::models::{StockForm, ViewRow};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One-shot message shown on the next rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    pub category: String,
    pub message: String,
}

impl Flash {
    pub fn success(message: impl Into<String>) -> Self {
        Flash {
            category: "success".to_string(),
            message: message.into(),
        }
    }

    pub fn danger(message: impl Into<String>) -> Self {
        Flash {
            category: "danger".to_string(),
            message: message.into(),
        }
    }

    /// Cookie-safe encoding.
    pub fn encode(&self) -> String {
        hex::encode(serde_json::to_vec(self).unwrap_or_default())
    }

    pub fn decode(raw: &str) -> Option<Flash> {
        let bytes = hex::decode(raw).ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}

/// Per-request page chrome.
pub struct Page<'a> {
    pub assets_root: &'a str,
    pub identity: Option<&'a Identity>,
    pub flashes: Vec<Flash>,
}

pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn money(d: &Option<Decimal>) -> String {
    d.map(|v| v.round_dp(2).normalize().to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn layout(page: &Page, title: &str, body: &str) -> String {
    let nav = match page.identity {
        Some(id) if id.is_admin => format!(
            r#"<a href="/">Portfolio</a> <a href="/add">Add stock</a> <a href="/intraday_data">Intraday</a> <span>{}</span> <a href="/logout">Logout</a>"#,
            escape(&id.username)
        ),
        Some(id) => format!(
            r#"<a href="/">Portfolio</a> <a href="/intraday_data">Intraday</a> <span>{}</span> <a href="/logout">Logout</a>"#,
            escape(&id.username)
        ),
        None => r#"<a href="/">Portfolio</a> <a href="/intraday_data">Intraday</a> <a href="/login">Login</a> <a href="/register">Register</a>"#.to_string(),
    };
    let flashes: String = page
        .flashes
        .iter()
        .map(|f| {
            format!(
                r#"<div class="alert alert-{}">{}</div>"#,
                escape(&f.category),
                escape(&f.message)
            )
        })
        .collect();
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<link rel="stylesheet" href="{assets}/css/style.css">
</head>
<body>
<nav>{nav}</nav>
{flashes}
<main>
{body}
</main>
</body>
</html>"#,
        title = escape(title),
        assets = escape(page.assets_root),
        nav = nav,
        flashes = flashes,
        body = body
    )
}

pub fn index(page: &Page, rows: &[ViewRow]) -> String {
    let admin = page.identity.map(|i| i.is_admin).unwrap_or(false);
    let mut body = String::from(
        "<h1>Portfolio</h1>\n<table class=\"data\">\n<tr><th>Symbol</th><th>Buy price</th><th>Latest price</th><th>Profit/Loss %</th><th>Target 1</th><th>Target 2</th><th>Cut loss</th><th>Note</th><th>Added</th>",
    );
    if admin {
        body.push_str("<th></th>");
    }
    body.push_str("</tr>\n");
    for row in rows {
        let pl_class = match row.profit_loss_pct {
            Some(p) if p.is_sign_negative() && !p.is_zero() => "loss",
            Some(_) => "profit",
            None => "",
        };
        body.push_str(&format!(
            r#"<tr><td>{}</td><td>{}</td><td>{}</td><td class="{}">{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td>"#,
            escape(&row.symbol),
            money(&Some(row.buy_price)),
            money(&row.latest_price),
            pl_class,
            money(&row.profit_loss_pct),
            money(&row.target1),
            money(&row.target2),
            money(&row.cut_loss),
            escape(row.note.as_deref().unwrap_or("")),
            escape(&row.created_at),
        ));
        if admin {
            body.push_str(&format!(
                r#"<td><a href="/edit/{id}">Edit</a> <a href="/delete/{id}">Delete</a></td>"#,
                id = row.id
            ));
        }
        body.push_str("</tr>\n");
    }
    body.push_str("</table>");
    layout(page, "Portfolio", &body)
}

pub fn login(page: &Page) -> String {
    let body = r#"<h1>Login</h1>
<form method="post" action="/login">
<label>Username <input name="username" required></label>
<label>Password <input name="password" type="password" required></label>
<button type="submit">Login</button>
</form>"#;
    layout(page, "Login", body)
}

pub fn register(page: &Page, allow_admin: bool) -> String {
    let admin_box = if allow_admin {
        r#"<label><input name="is_admin" type="checkbox"> Admin</label>"#
    } else {
        ""
    };
    let body = format!(
        r#"<h1>Register</h1>
<form method="post" action="/register">
<label>Username <input name="username" required></label>
<label>Password <input name="password" type="password" required></label>
{}
<button type="submit">Register</button>
</form>"#,
        admin_box
    );
    layout(page, "Register", &body)
}

/// Add form when `id` is `None`, edit form otherwise.
pub fn stock_form(page: &Page, id: Option<i64>, form: &StockForm) -> String {
    let (title, action) = match id {
        Some(id) => ("Edit stock".to_string(), format!("/edit/{}", id)),
        None => ("Add stock".to_string(), "/add".to_string()),
    };
    let field = |name: &str, label: &str, value: &str| {
        format!(
            r#"<label>{} <input name="{}" value="{}"></label>"#,
            label,
            name,
            escape(value)
        )
    };
    let body = format!(
        r#"<h1>{title}</h1>
<form method="post" action="{action}">
{symbol}
{buy_price}
{target1}
{target2}
{cut_loss}
<label>Note <textarea name="note">{note}</textarea></label>
<button type="submit">Save</button>
</form>"#,
        title = title,
        action = action,
        symbol = field("symbol", "Symbol", &form.symbol),
        buy_price = field("buy_price", "Buy price", &form.buy_price),
        target1 = field("target1", "Target 1", &form.target1),
        target2 = field("target2", "Target 2", &form.target2),
        cut_loss = field("cut_loss", "Cut loss", &form.cut_loss),
        note = escape(&form.note),
    );
    layout(page, &title, &body)
}

pub fn intraday(page: &Page, symbol: Option<&str>, report: Option<&IntradayReport>) -> String {
    let selected: Vec<InvestorClass> = report
        .map(|r| r.classes.clone())
        .unwrap_or_else(crate::intraday::default_classes);
    let boxes: String = InvestorClass::ALL
        .iter()
        .map(|c| {
            let name = c.to_string().to_lowercase();
            let checked = if selected.contains(c) { " checked" } else { "" };
            format!(
                r#"<label><input type="checkbox" name="{}"{}> {}</label> "#,
                name, checked, c
            )
        })
        .collect();
    let mut body = format!(
        r#"<h1>Intraday tape</h1>
<form method="post" action="/intraday_data">
<label>Symbol <input name="symbol" value="{}" required></label>
{}
<button type="submit">Fetch</button>
</form>"#,
        escape(symbol.unwrap_or("")),
        boxes
    );

    if let Some(report) = report {
        body.push_str(&format!(
            "\n<h2>{}: {} of {} trades</h2>\n<table class=\"data summary\">\n<tr><th>Investor</th><th>Buy volume</th><th>Sell volume</th><th>Unmatched volume</th><th>Net volume</th><th>Trades</th></tr>\n",
            escape(&report.symbol),
            report.details.len(),
            report.total_trades
        ));
        for row in &report.summary {
            body.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                row.investor,
                row.buy_volume,
                row.sell_volume,
                row.unknown_volume,
                row.net_volume(),
                row.trade_count
            ));
        }
        body.push_str("</table>\n<table class=\"data details\">\n<tr><th>Time</th><th>Price</th><th>Volume</th><th>Side</th><th>Investor</th></tr>\n");
        for trade in &report.details {
            body.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                escape(&trade.time),
                trade.price.normalize(),
                trade.volume,
                trade.side,
                trade.investor
            ));
        }
        body.push_str("</table>");
    }
    layout(page, "Intraday tape", &body)
}

pub fn error_page(page: &Page, title: &str, message: &str) -> String {
    layout(
        page,
        title,
        &format!("<h1>{}</h1>\n<p>{}</p>", escape(title), escape(message)),
    )
}
