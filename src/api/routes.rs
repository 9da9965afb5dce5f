//! API route handlers.
//!
//! All endpoints speak JSON with camelCase keys. Business-rule rejections
//! come back as structured `{error, message, ...}` bodies so clients can
//! react programmatically; storage failures surface as retryable 500s.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info};

use super::AppState;
use crate::auth::AuthError;
use crate::engine::PlaceBetError;
use crate::insights;
use crate::ledger;
use crate::types::{Bet, BetStatus, MatchStatus, Outcome};

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Wire-shaped error: HTTP status plus `{error, message, ...}` body.
pub struct ApiError {
    status: StatusCode,
    body: Value,
}

impl ApiError {
    fn new(status: StatusCode, code: &str, message: &str) -> Self {
        Self {
            status,
            body: json!({ "error": code, "message": message }),
        }
    }

    fn with(status: StatusCode, code: &str, message: &str, extra: Value) -> Self {
        let mut body = json!({ "error": code, "message": message });
        if let (Some(obj), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
            for (k, v) in extra {
                obj.insert(k.clone(), v.clone());
            }
        }
        Self { status, body }
    }

    fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "Invalid or missing token",
        )
    }

    fn not_found(message: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "storage_failure",
            "Transient storage failure; retry the request",
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        error!(error = %e, "Storage failure");
        Self::internal()
    }
}

impl From<ledger::LedgerError> for ApiError {
    fn from(e: ledger::LedgerError) -> Self {
        error!(error = %e, "Ledger failure");
        Self::internal()
    }
}

impl From<PlaceBetError> for ApiError {
    fn from(e: PlaceBetError) -> Self {
        match e {
            PlaceBetError::OutcomeNotFound(_) => Self::not_found("Outcome not found"),
            PlaceBetError::UserNotFound(_) => Self::not_found("User not found"),
            PlaceBetError::MarketSuspended { .. } => Self::new(
                StatusCode::BAD_REQUEST,
                "market_suspended",
                "Market is not accepting bets",
            ),
            PlaceBetError::MatchStarted { .. } => Self::new(
                StatusCode::BAD_REQUEST,
                "match_started",
                "Match has already started",
            ),
            PlaceBetError::OddsChanged { current, requested } => Self::with(
                StatusCode::BAD_REQUEST,
                "odds_changed",
                "Odds have changed since selection",
                json!({ "currentOdds": current, "requestedOdds": requested }),
            ),
            PlaceBetError::InsufficientBalance {
                available,
                required,
            } => Self::with(
                StatusCode::BAD_REQUEST,
                "insufficient_balance",
                "Not enough available balance",
                json!({ "available": available, "required": required }),
            ),
            PlaceBetError::InvalidStake { stake, min, max } => Self::with(
                StatusCode::BAD_REQUEST,
                "invalid_stake",
                "Stake is outside the accepted range",
                json!({ "stake": stake, "min": min, "max": max }),
            ),
            PlaceBetError::Storage(e) => {
                error!(error = %e, "Bet placement storage failure");
                Self::internal()
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::NonceNotFound => Self::new(
                StatusCode::BAD_REQUEST,
                "nonce_not_found",
                "Request a nonce first",
            ),
            AuthError::NonceExpired => {
                Self::new(StatusCode::BAD_REQUEST, "nonce_expired", "Nonce has expired")
            }
            AuthError::NonceMismatch => {
                Self::new(StatusCode::BAD_REQUEST, "invalid_nonce", "Nonce does not match")
            }
            AuthError::InvalidSignature => Self::new(
                StatusCode::UNAUTHORIZED,
                "invalid_signature",
                "Signature verification failed",
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Auth helpers
// ---------------------------------------------------------------------------

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Resolve the calling user or reject with 401.
async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<String, ApiError> {
    let token = bearer_token(headers).ok_or_else(ApiError::unauthorized)?;
    state
        .auth
        .resolve(token)
        .await
        .ok_or_else(ApiError::unauthorized)
}

/// Gate for the results/odds feed endpoints.
fn require_feed_token(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    match bearer_token(headers) {
        Some(token) if token == state.feed_token.expose_secret() => Ok(()),
        _ => Err(ApiError::unauthorized()),
    }
}

// ---------------------------------------------------------------------------
// Requests & queries
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NonceRequest {
    pub wallet_address: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    pub wallet_address: String,
    pub signature: String,
    pub nonce: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceBetRequest {
    pub outcome_id: String,
    pub stake: Decimal,
    pub odds_accepted: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRequest {
    pub home_score: i64,
    pub away_score: i64,
}

#[derive(Debug, Deserialize)]
pub struct OddsRequest {
    pub odds: Decimal,
}

fn default_limit() -> i64 {
    20
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

impl PageQuery {
    fn limit(&self) -> i64 {
        self.limit.clamp(1, 100)
    }
}

#[derive(Debug, Deserialize)]
pub struct BetsQuery {
    pub status: Option<BetStatus>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

#[derive(Debug, Deserialize)]
pub struct MatchesQuery {
    pub status: Option<MatchStatus>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

// ---------------------------------------------------------------------------
// Response shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceBody {
    pub available: Decimal,
    pub locked: Decimal,
    pub in_yield: Decimal,
    pub total: Decimal,
    pub currency: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BetBody {
    pub id: String,
    pub status: BetStatus,
    pub outcome_id: String,
    pub stake: Decimal,
    pub odds: Decimal,
    pub potential_return: Decimal,
    pub actual_return: Option<Decimal>,
    pub created_at: String,
    pub settled_at: Option<String>,
}

impl BetBody {
    fn from_bet(bet: &Bet) -> Self {
        Self {
            id: bet.id.clone(),
            status: bet.status,
            outcome_id: bet.outcome_id.clone(),
            stake: bet.stake,
            odds: bet.odds,
            potential_return: bet.potential_return,
            actual_return: bet.actual_return,
            created_at: bet.created_at.to_rfc3339(),
            settled_at: bet.settled_at.map(|t| t.to_rfc3339()),
        }
    }
}

fn outcome_body(o: &Outcome) -> Value {
    json!({
        "id": o.id,
        "name": o.name,
        "odds": o.odds,
        "previousOdds": o.previous_odds,
        "movement": o.movement(),
    })
}

fn timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339()
}

// ---------------------------------------------------------------------------
// Auth routes
// ---------------------------------------------------------------------------

/// POST /auth/nonce
pub async fn post_nonce(
    State(state): State<AppState>,
    Json(body): Json<NonceRequest>,
) -> Result<Json<Value>, ApiError> {
    if body.wallet_address.trim().is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "invalid_address",
            "Invalid wallet address",
        ));
    }

    let (nonce, expires_at) = state.auth.issue_nonce(&body.wallet_address).await;
    Ok(Json(json!({
        "nonce": nonce,
        "expiresAt": timestamp(expires_at),
    })))
}

/// POST /auth/connect
pub async fn post_connect(
    State(state): State<AppState>,
    Json(body): Json<ConnectRequest>,
) -> Result<Json<Value>, ApiError> {
    state
        .auth
        .verify_connect(&body.wallet_address, &body.signature, &body.nonce)
        .await?;

    let user = match state.store.user_by_wallet(&body.wallet_address).await? {
        Some(u) => u,
        None => state.store.create_user(&body.wallet_address).await?,
    };

    let (token, expires_at) = state.auth.issue_session(&user.id).await;
    info!(user_id = %user.id, "Wallet connected");

    Ok(Json(json!({
        "token": token,
        "expiresAt": timestamp(expires_at),
        "user": {
            "id": user.id,
            "walletAddress": user.wallet_address,
            "createdAt": timestamp(user.created_at),
        },
    })))
}

/// POST /auth/disconnect
pub async fn post_disconnect(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Json<Value> {
    if let Some(token) = bearer_token(&headers) {
        state.auth.revoke(token).await;
    }
    Json(json!({ "success": true }))
}

// ---------------------------------------------------------------------------
// User routes
// ---------------------------------------------------------------------------

/// GET /users/me
pub async fn get_me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let user_id = authenticate(&state, &headers).await?;

    let user = state
        .store
        .user(&user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let balance = ledger::balance(state.store.pool(), &user_id)
        .await?
        .unwrap_or_else(crate::types::Balance::zero);
    let stats = state.store.bet_stats(&user_id).await?;

    Ok(Json(json!({
        "id": user.id,
        "walletAddress": user.wallet_address,
        "balance": BalanceBody {
            available: balance.available,
            locked: balance.locked,
            in_yield: balance.in_yield,
            total: balance.total(),
            currency: "USDC",
        },
        "stats": {
            "totalBets": stats.total_bets,
            "wonBets": stats.won,
            "totalWagered": stats.total_staked,
            "totalProfit": stats.profit(),
            "roi": stats.roi(),
        },
        "createdAt": timestamp(user.created_at),
    })))
}

/// GET /users/me/balance
pub async fn get_balance(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<BalanceBody>, ApiError> {
    let user_id = authenticate(&state, &headers).await?;

    let balance = ledger::balance(state.store.pool(), &user_id)
        .await?
        .unwrap_or_else(crate::types::Balance::zero);

    Ok(Json(BalanceBody {
        available: balance.available,
        locked: balance.locked,
        in_yield: balance.in_yield,
        total: balance.total(),
        currency: "USDC",
    }))
}

/// GET /users/me/transactions
pub async fn get_transactions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>, ApiError> {
    let user_id = authenticate(&state, &headers).await?;

    let transactions = state
        .store
        .transactions_for_user(&user_id, query.limit(), query.offset)
        .await?;

    Ok(Json(json!({
        "transactions": transactions
            .iter()
            .map(|t| json!({
                "id": t.id,
                "type": t.tx_type,
                "amount": t.amount,
                "status": t.status,
                "betId": t.bet_id,
                "createdAt": timestamp(t.created_at),
            }))
            .collect::<Vec<_>>(),
        "pagination": { "limit": query.limit(), "offset": query.offset },
    })))
}

// ---------------------------------------------------------------------------
// Match routes
// ---------------------------------------------------------------------------

/// GET /matches
pub async fn list_matches(
    State(state): State<AppState>,
    Query(query): Query<MatchesQuery>,
) -> Result<Json<Value>, ApiError> {
    // Browsing defaults to the upcoming board.
    let status = query.status.or(Some(MatchStatus::Upcoming));
    let limit = query.limit.clamp(1, 100);
    let matches = state.store.matches(status, limit, query.offset).await?;

    let mut bodies = Vec::with_capacity(matches.len());
    for m in &matches {
        let markets = state.store.markets_for_match(&m.id).await?;
        let result_market = markets
            .iter()
            .find(|mk| mk.market_type == crate::types::MarketType::MatchResult);

        let mut best_odds = json!({ "home": null, "draw": null, "away": null });
        if let Some(market) = result_market {
            let outcomes = state.store.outcomes_for_market(&market.id).await?;
            for o in &outcomes {
                match o.name.as_str() {
                    "Home" => best_odds["home"] = json!(o.odds),
                    "Draw" => best_odds["draw"] = json!(o.odds),
                    "Away" => best_odds["away"] = json!(o.odds),
                    _ => {}
                }
            }
        }

        bodies.push(json!({
            "id": m.id,
            "league": m.league,
            "homeTeam": m.home_team,
            "awayTeam": m.away_team,
            "startTime": timestamp(m.start_time),
            "status": m.status,
            "bestOdds": best_odds,
            "marketsCount": markets.len(),
        }));
    }

    Ok(Json(json!({
        "matches": bodies,
        "pagination": { "limit": limit, "offset": query.offset },
    })))
}

/// GET /matches/:id
pub async fn get_match(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let m = state
        .store
        .match_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Match not found"))?;

    let mut markets = Vec::new();
    for market in state.store.markets_for_match(&id).await? {
        let outcomes = state.store.outcomes_for_market(&market.id).await?;
        markets.push(json!({
            "id": market.id,
            "name": market.name,
            "type": market.market_type,
            "line": market.line,
            "status": market.status,
            "outcomes": outcomes.iter().map(outcome_body).collect::<Vec<_>>(),
        }));
    }

    Ok(Json(json!({
        "id": m.id,
        "league": m.league,
        "homeTeam": m.home_team,
        "awayTeam": m.away_team,
        "startTime": timestamp(m.start_time),
        "status": m.status,
        "homeScore": m.home_score,
        "awayScore": m.away_score,
        "markets": markets,
    })))
}

/// GET /matches/:id/insight
pub async fn get_insight(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let m = state
        .store
        .match_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Match not found"))?;

    let prediction = insights::predict(&m.home_team, &m.away_team);
    let insight = insights::insight(&m.home_team, &m.away_team);

    Ok(Json(json!({
        "matchId": m.id,
        "prediction": prediction,
        "insight": insight,
    })))
}

// ---------------------------------------------------------------------------
// Feed routes
// ---------------------------------------------------------------------------

/// POST /matches/:id/result — results feed trigger.
///
/// Fire-and-forget: settlement runs in the background and its errors are
/// logged, not surfaced, since the trigger is an asynchronous feed that will
/// redeliver.
pub async fn post_result(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<ResultRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    require_feed_token(&state, &headers)?;

    if body.home_score < 0 || body.away_score < 0 {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "invalid_result",
            "Scores must be non-negative",
        ));
    }

    let settlements = state.settlements.clone();
    tokio::spawn(async move {
        if let Err(e) = settlements
            .settle_match(&id, body.home_score, body.away_score)
            .await
        {
            error!(match_id = %id, error = %e, "Settlement failed");
        }
    });

    Ok((StatusCode::ACCEPTED, Json(json!({ "accepted": true }))))
}

/// POST /matches/:id/void — postponement/cancellation trigger.
pub async fn post_void(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    require_feed_token(&state, &headers)?;

    let settlements = state.settlements.clone();
    tokio::spawn(async move {
        if let Err(e) = settlements.void_match(&id).await {
            error!(match_id = %id, error = %e, "Void failed");
        }
    });

    Ok((StatusCode::ACCEPTED, Json(json!({ "accepted": true }))))
}

/// POST /outcomes/:id/odds — odds feed write-through.
pub async fn post_odds(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<OddsRequest>,
) -> Result<Json<Value>, ApiError> {
    require_feed_token(&state, &headers)?;

    if body.odds <= Decimal::ONE {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "invalid_odds",
            "Decimal odds must be greater than 1.0",
        ));
    }

    if !state.store.update_odds(&id, body.odds).await? {
        return Err(ApiError::not_found("Outcome not found"));
    }
    Ok(Json(json!({ "updated": true })))
}

// ---------------------------------------------------------------------------
// Bet routes
// ---------------------------------------------------------------------------

/// POST /bets
pub async fn post_bet(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<PlaceBetRequest>,
) -> Result<Json<Value>, ApiError> {
    let user_id = authenticate(&state, &headers).await?;

    let bet = state
        .bets
        .place_bet(&user_id, &body.outcome_id, body.stake, body.odds_accepted)
        .await?;

    let snapshot = state.store.outcome_snapshot(&bet.outcome_id).await?;
    let outcome = snapshot.map(|s| {
        json!({
            "id": s.outcome.id,
            "name": s.outcome.name,
            "matchId": s.match_id,
        })
    });

    Ok(Json(json!({
        "id": bet.id,
        "status": bet.status,
        "outcome": outcome,
        "stake": bet.stake,
        "odds": bet.odds,
        "potentialReturn": bet.potential_return,
        "createdAt": timestamp(bet.created_at),
    })))
}

/// GET /bets
pub async fn list_bets(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<BetsQuery>,
) -> Result<Json<Value>, ApiError> {
    let user_id = authenticate(&state, &headers).await?;
    let limit = query.limit.clamp(1, 100);

    let bets = state
        .store
        .bets_for_user(&user_id, query.status, limit, query.offset)
        .await?;

    let total_stake: Decimal = bets.iter().map(|b| b.stake).sum();
    let potential_return: Decimal = bets
        .iter()
        .filter(|b| b.status == BetStatus::Pending)
        .map(|b| b.potential_return)
        .sum();

    Ok(Json(json!({
        "bets": bets.iter().map(BetBody::from_bet).collect::<Vec<_>>(),
        "summary": {
            "totalStake": total_stake,
            "potentialReturn": potential_return,
        },
        "pagination": { "limit": limit, "offset": query.offset },
    })))
}

/// GET /bets/history
pub async fn bet_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>, ApiError> {
    let user_id = authenticate(&state, &headers).await?;

    let bets = state
        .store
        .settled_bets_for_user(&user_id, query.limit(), query.offset)
        .await?;
    let stats = state.store.bet_stats(&user_id).await?;

    Ok(Json(json!({
        "bets": bets
            .iter()
            .map(|b| {
                let mut body = serde_json::to_value(BetBody::from_bet(b)).unwrap_or_default();
                body["profit"] = json!(b.profit());
                body
            })
            .collect::<Vec<_>>(),
        "summary": {
            "totalBets": stats.total_bets,
            "won": stats.won,
            "lost": stats.lost,
            "void": stats.voided,
            "totalStake": stats.total_staked,
            "totalReturn": stats.total_returned,
            "profit": stats.profit(),
            "roi": stats.roi(),
        },
        "pagination": { "limit": query.limit(), "offset": query.offset },
    })))
}

/// GET /bets/:id
pub async fn get_bet(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let user_id = authenticate(&state, &headers).await?;

    let bet = state
        .store
        .bet(&id)
        .await?
        .filter(|b| b.user_id == user_id)
        .ok_or_else(|| ApiError::not_found("Bet not found"))?;

    let snapshot = state.store.outcome_snapshot(&bet.outcome_id).await?;
    let outcome = snapshot.map(|s| {
        json!({
            "id": s.outcome.id,
            "name": s.outcome.name,
            "currentOdds": s.outcome.odds,
            "matchId": s.match_id,
        })
    });

    let mut body = serde_json::to_value(BetBody::from_bet(&bet)).unwrap_or_default();
    body["outcome"] = outcome.unwrap_or(Value::Null);
    body["profit"] = json!(bet.profit());
    Ok(Json(body))
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "timestamp": timestamp(Utc::now()) }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
