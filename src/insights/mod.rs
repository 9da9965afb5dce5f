//! Prediction Service.
//!
//! Stateless heuristics over static team strength ratings: match outcome
//! probabilities, narrative insight text, and odds math helpers. None of
//! this touches the money-moving core; handlers call it per request.

use rust_decimal::Decimal;
use serde::Serialize;

/// Home advantage applied to the home side's rating.
const HOME_ADVANTAGE: f64 = 0.08;

/// Rating assumed for teams missing from the table.
const DEFAULT_RATING: f64 = 70.0;

// ---------------------------------------------------------------------------
// Odds math
// ---------------------------------------------------------------------------

/// Payout for a winning bet: stake times decimal odds.
pub fn potential_return(stake: Decimal, odds: Decimal) -> Decimal {
    stake * odds
}

/// Net profit for a winning bet.
pub fn profit(stake: Decimal, odds: Decimal) -> Decimal {
    stake * (odds - Decimal::ONE)
}

/// Probability implied by decimal odds: 1 / odds.
pub fn implied_probability(odds: Decimal) -> Option<Decimal> {
    if odds <= Decimal::ZERO {
        return None;
    }
    Some(Decimal::ONE / odds)
}

/// Decimal odds implied by a probability: 1 / p.
pub fn probability_to_odds(probability: Decimal) -> Option<Decimal> {
    if probability <= Decimal::ZERO {
        return None;
    }
    Some(Decimal::ONE / probability)
}

// ---------------------------------------------------------------------------
// Prediction
// ---------------------------------------------------------------------------

/// Outcome probabilities for a fixture. Sums to 1 (up to rounding).
#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    pub home: f64,
    pub draw: f64,
    pub away: f64,
    pub confidence: f64,
}

/// Narrative analysis for a fixture.
#[derive(Debug, Clone, Serialize)]
pub struct Insight {
    pub text: String,
    pub factors: Vec<String>,
}

fn team_rating(name: &str) -> f64 {
    match name {
        "Manchester City" => 92.0,
        "Arsenal" => 88.0,
        "Liverpool" => 87.0,
        "Manchester United" => 82.0,
        "Chelsea" => 81.0,
        "Tottenham" => 80.0,
        "Newcastle" => 79.0,
        "Aston Villa" => 77.0,
        "Brighton" => 75.0,
        "West Ham" => 74.0,
        "Real Madrid" => 91.0,
        "Barcelona" => 89.0,
        "Atletico Madrid" => 84.0,
        "Real Sociedad" => 78.0,
        "Bayern Munich" => 90.0,
        "Borussia Dortmund" => 83.0,
        "RB Leipzig" => 81.0,
        "Bayer Leverkusen" => 85.0,
        "Inter Milan" => 86.0,
        "AC Milan" => 82.0,
        "Juventus" => 83.0,
        "Napoli" => 84.0,
        _ => DEFAULT_RATING,
    }
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

/// Heuristic probabilities for home/draw/away from the rating gap.
pub fn predict(home_team: &str, away_team: &str) -> Prediction {
    let home_rating = team_rating(home_team) * (1.0 + HOME_ADVANTAGE);
    let away_rating = team_rating(away_team);

    let rating_diff = home_rating - away_rating;
    let total_rating = home_rating + away_rating;

    let mut home = 0.35 + (rating_diff / total_rating) * 0.3;
    let mut away = 0.30 - (rating_diff / total_rating) * 0.3;
    let mut draw = 0.35 - (rating_diff / total_rating).abs() * 0.15;

    home = home.clamp(0.1, 0.7);
    away = away.clamp(0.1, 0.7);
    draw = draw.clamp(0.15, 0.4);

    let total = home + draw + away;
    home /= total;
    draw /= total;
    away /= total;

    let confidence = (0.55 + rating_diff.abs() / 100.0 * 0.3).min(0.85);

    Prediction {
        home: round3(home),
        draw: round3(draw),
        away: round3(away),
        confidence: (confidence * 100.0).round() / 100.0,
    }
}

/// Narrative insight for a fixture, derived from the same ratings.
pub fn insight(home_team: &str, away_team: &str) -> Insight {
    let home_rating = team_rating(home_team);
    let away_rating = team_rating(away_team);
    let prediction = predict(home_team, away_team);

    let mut factors = Vec::new();
    let text;

    if home_rating > away_rating + 10.0 {
        factors.push(format!("{home_team} significantly stronger on paper"));
        factors.push("Home advantage amplifies the gap".to_string());
        text = format!(
            "{home_team} enter this fixture as clear favorites. {away_team} will need \
             an exceptional performance to take anything from the game."
        );
    } else if away_rating > home_rating + 10.0 {
        factors.push(format!("{away_team} stronger despite playing away"));
        factors.push("Road form will be tested".to_string());
        text = format!(
            "{away_team} are favored even away from home. {home_team} will look to \
             the home crowd to close the quality gap."
        );
    } else {
        factors.push("Evenly matched sides".to_string());
        factors.push("Home advantage could be decisive".to_string());
        text = format!(
            "Little separates {home_team} and {away_team} on recent form. Expect a \
             tight contest where small margins decide it."
        );
    }

    factors.push(format!(
        "Model probabilities: home {:.0}%, draw {:.0}%, away {:.0}%",
        prediction.home * 100.0,
        prediction.draw * 100.0,
        prediction.away * 100.0,
    ));

    Insight { text, factors }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
