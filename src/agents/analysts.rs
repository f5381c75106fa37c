//! Core analyst seats
//!
//! The four analysts that react to the event in parallel and are re-run
//! when the risk review sends the committee back for another round.

use super::{
    confidence_field, describe_event, describe_prior, required_f64, required_str, stance_field,
    string_list, Agent, AgentOpinion,
};
use crate::error::OrchestrationError;
use crate::models::{AgentRole, Context, Finding, FindingPayload, Stance, TimeHorizon};
use crate::Result;
use serde_json::Value;
use std::collections::BTreeMap;

const FALLBACK_CONFIDENCE: f64 = 0.3;

fn is_short(horizon: TimeHorizon) -> bool {
    matches!(horizon, TimeHorizon::Immediate | TimeHorizon::Short)
}

//
// ================= Narrative Arbitrageur =================
//

/// Scores how far a story can travel and whether it is already priced in.
pub struct NarrativeArbitrageurAgent;

impl Agent for NarrativeArbitrageurAgent {
    fn role(&self) -> AgentRole {
        AgentRole::NarrativeArbitrageur
    }

    fn system_prompt(&self) -> &'static str {
        "You are a Wall Street narrative investing specialist. Score the story's spread potential \
         and market impact: shareability, sentiment gap, simplicity, counter-intuitiveness, conflict. \
         Return JSON with fields: one_liner, meme_potential (0-1), influencers_take (2-4 items), \
         lifecycle_days (integer), priced_in (bool), stance (strong_buy|buy|hold|sell|strong_sell), \
         confidence (0-1)."
    }

    fn user_prompt(&self, ctx: &Context, prior: &[Finding]) -> String {
        format!("{}{}", describe_event(ctx), describe_prior(ctx, prior))
    }

    fn interpret(&self, payload: &Value, _ctx: &Context) -> Result<AgentOpinion> {
        let one_liner = required_str(payload, "one_liner")?;
        let meme_potential = required_f64(payload, "meme_potential")?.clamp(0.0, 1.0);
        let lifecycle_days = payload
            .get("lifecycle_days")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32;
        let priced_in = payload
            .get("priced_in")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Ok(AgentOpinion {
            summary: one_liner.clone(),
            payload: FindingPayload::Narrative {
                one_liner,
                meme_potential,
                influencers_take: string_list(payload, "influencers_take"),
                lifecycle_days,
                priced_in,
            },
            stance: stance_field(payload),
            confidence: confidence_field(payload),
        })
    }

    fn fallback(&self, ctx: &Context) -> AgentOpinion {
        let headline = ctx.headline_or_topic();
        let one_liner = if headline.chars().count() <= 50 {
            headline.to_string()
        } else {
            format!("{}...", headline.chars().take(47).collect::<String>())
        };
        let short = is_short(ctx.time_horizon);

        AgentOpinion {
            summary: format!("Fallback narrative read: {}", one_liner),
            payload: FindingPayload::Narrative {
                one_liner,
                meme_potential: if short { 0.7 } else { 0.5 },
                influencers_take: vec![
                    "Commentators: the story is catchy and travels well".to_string(),
                    "Watch whether the topic sustains attention".to_string(),
                ],
                lifecycle_days: if short { 3 } else { 10 },
                priced_in: false,
            },
            stance: Some(Stance::Hold),
            confidence: FALLBACK_CONFIDENCE,
        }
    }
}

//
// ================= First-Order Impact Quant =================
//

/// Quantifies the direct hit to the company model.
pub struct FirstOrderQuantAgent;

impl Agent for FirstOrderQuantAgent {
    fn role(&self) -> AgentRole {
        AgentRole::FirstOrderQuant
    }

    fn system_prompt(&self) -> &'static str {
        "You are a sell-side quantitative analyst sizing the first-order impact of an event on the \
         company model. Return JSON with fields: pnl_line (P&L|BS|CF), magnitude \
         (millions|tens_of_millions|hundreds_of_millions), kpi_shifts_pct (object of KPI -> percent), \
         recurring (bool), stance (strong_buy|buy|hold|sell|strong_sell), confidence (0-1). \
         Without data, give a conservative estimate."
    }

    fn user_prompt(&self, ctx: &Context, prior: &[Finding]) -> String {
        format!(
            "{}\nEstimate using historical comparables and elasticity assumptions.{}",
            describe_event(ctx),
            describe_prior(ctx, prior)
        )
    }

    fn interpret(&self, payload: &Value, _ctx: &Context) -> Result<AgentOpinion> {
        let pnl_line = required_str(payload, "pnl_line")?;
        let magnitude = required_str(payload, "magnitude")?;
        let kpi_shifts_pct: BTreeMap<String, f64> = payload
            .get("kpi_shifts_pct")
            .and_then(Value::as_object)
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| v.as_f64().map(|n| (k.clone(), n)))
                    .collect()
            })
            .ok_or_else(|| {
                OrchestrationError::MalformedPayload("missing object field 'kpi_shifts_pct'".to_string())
            })?;
        let recurring = payload
            .get("recurring")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Ok(AgentOpinion {
            summary: format!(
                "{} impact of {} ({})",
                pnl_line,
                magnitude,
                if recurring { "recurring" } else { "one-off" }
            ),
            payload: FindingPayload::QuantImpact {
                pnl_line,
                magnitude,
                kpi_shifts_pct,
                recurring,
            },
            stance: stance_field(payload),
            confidence: confidence_field(payload),
        })
    }

    fn fallback(&self, ctx: &Context) -> AgentOpinion {
        let kpi_shifts_pct = BTreeMap::from([
            ("revenue_pct".to_string(), 1.5),
            ("eps_pct".to_string(), 0.5),
        ]);

        AgentOpinion {
            summary: "Fallback quant estimate: modest P&L impact".to_string(),
            payload: FindingPayload::QuantImpact {
                pnl_line: "P&L".to_string(),
                magnitude: "tens_of_millions".to_string(),
                kpi_shifts_pct,
                recurring: !is_short(ctx.time_horizon),
            },
            stance: Some(Stance::Hold),
            confidence: FALLBACK_CONFIDENCE,
        }
    }
}

//
// ================= Contrarian Skeptic =================
//

/// Short-seller style due diligence: red flags, data validity, overreaction.
pub struct ContrarianSkepticAgent;

impl Agent for ContrarianSkepticAgent {
    fn role(&self) -> AgentRole {
        AgentRole::ContrarianSkeptic
    }

    fn system_prompt(&self) -> &'static str {
        "You are an activist short-seller researcher. List red_flags (motive, governance, accounting), \
         data_validity_risks (out-of-sample, definitions, channel checks) and overreaction_signals \
         (crowding, extreme sentiment, reflexivity), one reason each. Also return stance \
         (strong_buy|buy|hold|sell|strong_sell) and confidence (0-1). Return JSON only."
    }

    fn user_prompt(&self, ctx: &Context, prior: &[Finding]) -> String {
        format!(
            "{}\nAvoid empty accusations.{}",
            describe_event(ctx),
            describe_prior(ctx, prior)
        )
    }

    fn interpret(&self, payload: &Value, _ctx: &Context) -> Result<AgentOpinion> {
        if payload.get("red_flags").is_none() && payload.get("overreaction_signals").is_none() {
            return Err(OrchestrationError::MalformedPayload(
                "contrarian payload has neither red_flags nor overreaction_signals".to_string(),
            ));
        }

        let red_flags = string_list(payload, "red_flags");
        let data_validity_risks = string_list(payload, "data_validity_risks");
        let overreaction_signals = string_list(payload, "overreaction_signals");

        Ok(AgentOpinion {
            summary: format!(
                "{} red flags, {} data risks, {} overreaction signals",
                red_flags.len(),
                data_validity_risks.len(),
                overreaction_signals.len()
            ),
            payload: FindingPayload::Contrarian {
                red_flags,
                data_validity_risks,
                overreaction_signals,
            },
            stance: stance_field(payload),
            confidence: confidence_field(payload),
        })
    }

    fn fallback(&self, _ctx: &Context) -> AgentOpinion {
        AgentOpinion {
            summary: "Fallback skeptic checklist".to_string(),
            payload: FindingPayload::Contrarian {
                red_flags: vec!["Management motive unclear: timing may be opportunistic".to_string()],
                data_validity_risks: vec![
                    "Historical samples may not match the current macro backdrop".to_string(),
                ],
                overreaction_signals: vec![
                    "Social attention is elevated; short-term volatility risk".to_string(),
                ],
            },
            stance: Some(Stance::Hold),
            confidence: FALLBACK_CONFIDENCE,
        }
    }
}

//
// ================= Second-Order Effects Strategist =================
//

/// Maps knock-on effects across competitors, regulators, supply chain and consumers.
pub struct SecondOrderStrategistAgent;

impl Agent for SecondOrderStrategistAgent {
    fn role(&self) -> AgentRole {
        AgentRole::SecondOrderStrategist
    }

    fn system_prompt(&self) -> &'static str {
        "You are a second-order effects strategist at a macro hedge fund. Return JSON with \
         competitor_moves, regulatory_watchpoints, supply_chain_shift, consumer_behavior_change \
         (each a list covering immediate / 1-3 months / 6-12 months), stance \
         (strong_buy|buy|hold|sell|strong_sell) and confidence (0-1)."
    }

    fn user_prompt(&self, ctx: &Context, prior: &[Finding]) -> String {
        format!("{}{}", describe_event(ctx), describe_prior(ctx, prior))
    }

    fn temperature(&self) -> f32 {
        0.2
    }

    fn interpret(&self, payload: &Value, _ctx: &Context) -> Result<AgentOpinion> {
        const KEYS: [&str; 4] = [
            "competitor_moves",
            "regulatory_watchpoints",
            "supply_chain_shift",
            "consumer_behavior_change",
        ];
        if KEYS.iter().all(|k| payload.get(k).is_none()) {
            return Err(OrchestrationError::MalformedPayload(
                "second-order payload has no effect lists".to_string(),
            ));
        }

        let competitor_moves = string_list(payload, "competitor_moves");
        let regulatory_watchpoints = string_list(payload, "regulatory_watchpoints");

        Ok(AgentOpinion {
            summary: format!(
                "{} competitor moves, {} regulatory watchpoints",
                competitor_moves.len(),
                regulatory_watchpoints.len()
            ),
            payload: FindingPayload::SecondOrder {
                competitor_moves,
                regulatory_watchpoints,
                supply_chain_shift: string_list(payload, "supply_chain_shift"),
                consumer_behavior_change: string_list(payload, "consumer_behavior_change"),
            },
            stance: stance_field(payload),
            confidence: confidence_field(payload),
        })
    }

    fn fallback(&self, _ctx: &Context) -> AgentOpinion {
        AgentOpinion {
            summary: "Fallback second-order map".to_string(),
            payload: FindingPayload::SecondOrder {
                competitor_moves: vec![
                    "Major competitors may follow with price cuts".to_string(),
                    "Some players wait and see".to_string(),
                ],
                regulatory_watchpoints: vec![
                    "Regulators may focus on consumer protection and antitrust".to_string(),
                ],
                supply_chain_shift: vec![
                    "Upstream bargaining power rises".to_string(),
                    "Downstream channels consolidate".to_string(),
                ],
                consumer_behavior_change: vec![
                    "Attention-driven short-term conversion rises".to_string(),
                ],
            },
            stance: Some(Stance::Hold),
            confidence: FALLBACK_CONFIDENCE,
        }
    }
}
