//! Specialist seats: data intelligence, macro strategy and risk control

use super::{
    confidence_field, describe_event, describe_prior, required_f64, required_str, stance_field,
    string_list, Agent, AgentOpinion,
};
use crate::models::{AgentRole, Context, Finding, FindingPayload, Stance};
use crate::reasoning::truncate;
use crate::Result;
use serde_json::{json, Value};

const FALLBACK_CONFIDENCE: f64 = 0.3;
const MARKET_DATA_EXCERPT_CHARS: usize = 1500;

//
// ================= Data Intelligence Specialist =================
//

/// Fuses the fetched market and sentiment datasets into one snapshot.
pub struct DataIntelligenceAgent;

impl Agent for DataIntelligenceAgent {
    fn role(&self) -> AgentRole {
        AgentRole::DataIntelligence
    }

    fn system_prompt(&self) -> &'static str {
        "You are a Bloomberg Terminal data analyst. From the event and the raw datasets, return JSON \
         with market_snapshot (object: price_movement, volume_analysis, volatility_metrics, \
         technical_signals), sentiment_score (-1 to 1), data_quality_score (0-1), anomalies (list), \
         stance (strong_buy|buy|hold|sell|strong_sell) and confidence (0-1)."
    }

    fn user_prompt(&self, ctx: &Context, prior: &[Finding]) -> String {
        let datasets = if ctx.market_data.is_empty() {
            "No external datasets available.".to_string()
        } else {
            truncate(
                &serde_json::to_string(&ctx.market_data.sources).unwrap_or_default(),
                MARKET_DATA_EXCERPT_CHARS,
            )
        };

        format!(
            "{}\nRaw datasets: {}{}",
            describe_event(ctx),
            datasets,
            describe_prior(ctx, prior)
        )
    }

    fn interpret(&self, payload: &Value, _ctx: &Context) -> Result<AgentOpinion> {
        let sentiment_score = required_f64(payload, "sentiment_score")?.clamp(-1.0, 1.0);
        let data_quality_score = payload
            .get("data_quality_score")
            .and_then(Value::as_f64)
            .unwrap_or(0.7)
            .clamp(0.0, 1.0);
        let market_snapshot = payload.get("market_snapshot").cloned().unwrap_or(Value::Null);
        let anomalies = string_list(payload, "anomalies");

        Ok(AgentOpinion {
            summary: format!(
                "Sentiment {:+.2}, data quality {:.2}, {} anomalies",
                sentiment_score,
                data_quality_score,
                anomalies.len()
            ),
            payload: FindingPayload::DataIntelligence {
                market_snapshot,
                sentiment_score,
                data_quality_score,
                anomalies,
            },
            stance: stance_field(payload),
            confidence: confidence_field(payload),
        })
    }

    fn fallback(&self, ctx: &Context) -> AgentOpinion {
        let market_snapshot = if ctx.market_data.is_empty() {
            json!({
                "price_movement": {"trend": "neutral", "magnitude": 0.0},
                "volume_analysis": {"relative_volume": 1.0, "volume_trend": "normal"},
                "volatility_metrics": {"current_vol": 0.2, "vol_percentile": 50},
            })
        } else {
            serde_json::to_value(&ctx.market_data.sources).unwrap_or(Value::Null)
        };

        AgentOpinion {
            summary: "Fallback data snapshot; manual review advised".to_string(),
            payload: FindingPayload::DataIntelligence {
                market_snapshot,
                sentiment_score: 0.0,
                data_quality_score: 0.6,
                anomalies: vec!["Data collection degraded; manual review advised".to_string()],
            },
            stance: Some(Stance::Hold),
            confidence: FALLBACK_CONFIDENCE,
        }
    }
}

//
// ================= Macro Strategist =================
//

/// Places the event in the prevailing market regime.
pub struct MacroStrategistAgent;

impl Agent for MacroStrategistAgent {
    fn role(&self) -> AgentRole {
        AgentRole::MacroStrategist
    }

    fn system_prompt(&self) -> &'static str {
        "You are a global macro strategist. Return JSON with market_regime \
         (bull_market|bear_market|transition|neutral), outlook (one paragraph), key_drivers (list), \
         regime_risk (0-1, optional), stance (strong_buy|buy|hold|sell|strong_sell) and confidence (0-1)."
    }

    fn user_prompt(&self, ctx: &Context, prior: &[Finding]) -> String {
        format!("{}{}", describe_event(ctx), describe_prior(ctx, prior))
    }

    fn temperature(&self) -> f32 {
        0.2
    }

    fn interpret(&self, payload: &Value, _ctx: &Context) -> Result<AgentOpinion> {
        let market_regime = required_str(payload, "market_regime")?;
        let outlook = payload
            .get("outlook")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let regime_risk = payload
            .get("regime_risk")
            .and_then(Value::as_f64)
            .map(|r| r.clamp(0.0, 1.0));

        Ok(AgentOpinion {
            summary: format!("Regime {}: {}", market_regime, truncate(&outlook, 120)),
            payload: FindingPayload::Macro {
                market_regime,
                outlook,
                key_drivers: string_list(payload, "key_drivers"),
                regime_risk,
            },
            stance: stance_field(payload),
            confidence: confidence_field(payload),
        })
    }

    fn fallback(&self, _ctx: &Context) -> AgentOpinion {
        AgentOpinion {
            summary: "Fallback macro view: neutral regime".to_string(),
            payload: FindingPayload::Macro {
                market_regime: "neutral".to_string(),
                outlook: "Insufficient information to call the regime".to_string(),
                key_drivers: Vec::new(),
                regime_risk: None,
            },
            stance: Some(Stance::Hold),
            confidence: FALLBACK_CONFIDENCE,
        }
    }
}

//
// ================= Risk Controller =================
//

/// Independent risk review over everything the committee has said.
pub struct RiskControllerAgent;

impl RiskControllerAgent {
    /// Risk-limit alerts by score band.
    pub fn limit_alerts(score: f64) -> Vec<String> {
        if score > 0.8 {
            vec!["Severe: risk tolerance limit exceeded".to_string()]
        } else if score > 0.6 {
            vec!["Warning: approaching risk control line".to_string()]
        } else if score > 0.4 {
            vec!["Notice: monitor closely".to_string()]
        } else {
            Vec::new()
        }
    }

    fn default_controls(score: f64) -> Vec<String> {
        let controls: &[&str] = if score > 0.7 {
            &["Reduce position size", "Set strict stop-loss", "Consider hedging"]
        } else if score > 0.4 {
            &["Moderate position size", "Set reasonable stop-loss", "Monitor closely"]
        } else {
            &["Position may be increased", "Keep normal monitoring"]
        };
        controls.iter().map(|s| s.to_string()).collect()
    }
}

impl Agent for RiskControllerAgent {
    fn role(&self) -> AgentRole {
        AgentRole::RiskController
    }

    fn system_prompt(&self) -> &'static str {
        "You are the independent risk officer of an investment committee. Assess market, liquidity, \
         concentration, regulatory and decision-coherence risk. Return JSON with overall_risk_score \
         (0 = low, 1 = extreme), alerts (list), recommendations (list of concrete controls), stance \
         (strong_buy|buy|hold|sell|strong_sell) and confidence (0-1)."
    }

    fn user_prompt(&self, ctx: &Context, prior: &[Finding]) -> String {
        format!("{}{}", describe_event(ctx), describe_prior(ctx, prior))
    }

    fn interpret(&self, payload: &Value, _ctx: &Context) -> Result<AgentOpinion> {
        let overall_risk_score = required_f64(payload, "overall_risk_score")?.clamp(0.0, 1.0);

        let mut alerts = string_list(payload, "alerts");
        if alerts.is_empty() {
            alerts = Self::limit_alerts(overall_risk_score);
        }
        let mut recommendations = string_list(payload, "recommendations");
        if recommendations.is_empty() {
            recommendations = Self::default_controls(overall_risk_score);
        }

        Ok(AgentOpinion {
            summary: format!(
                "Overall risk {:.2} with {} alerts",
                overall_risk_score,
                alerts.len()
            ),
            payload: FindingPayload::RiskControl {
                overall_risk_score,
                alerts,
                recommendations,
            },
            stance: stance_field(payload),
            confidence: confidence_field(payload),
        })
    }

    fn fallback(&self, _ctx: &Context) -> AgentOpinion {
        let score = 0.5;
        AgentOpinion {
            summary: "Fallback risk review: medium risk".to_string(),
            payload: FindingPayload::RiskControl {
                overall_risk_score: score,
                alerts: Self::limit_alerts(score),
                recommendations: Self::default_controls(score),
            },
            stance: Some(Stance::Hold),
            confidence: FALLBACK_CONFIDENCE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_context;

    #[test]
    fn test_risk_controller_fills_alerts_from_score() {
        let ctx = sample_context();
        let opinion = RiskControllerAgent
            .interpret(&json!({"overall_risk_score": 0.85, "stance": "sell"}), &ctx)
            .unwrap();

        assert_eq!(opinion.payload.risk_signal(), Some(0.85));
        assert_eq!(opinion.payload.risk_flags().len(), 1);
        assert!(opinion.payload.risk_flags()[0].starts_with("Severe"));
        assert_eq!(opinion.stance, Some(Stance::Sell));
    }

    #[test]
    fn test_risk_limit_bands() {
        assert!(RiskControllerAgent::limit_alerts(0.3).is_empty());
        assert!(RiskControllerAgent::limit_alerts(0.5)[0].starts_with("Notice"));
        assert!(RiskControllerAgent::limit_alerts(0.7)[0].starts_with("Warning"));
    }

    #[test]
    fn test_risk_controller_fallback_is_medium() {
        let opinion = RiskControllerAgent.fallback(&sample_context());
        assert_eq!(opinion.payload.risk_signal(), Some(0.5));
        assert_eq!(opinion.confidence, FALLBACK_CONFIDENCE);
    }

    #[test]
    fn test_data_intelligence_prompt_includes_datasets() {
        let mut ctx = sample_context();
        ctx.market_data.insert("stock_service", json!({"NVDA": {"close": 912.4}}));
        let prompt = DataIntelligenceAgent.prompt(&ctx, &[]);
        assert!(prompt.user.contains("912.4"));

        let fallback = DataIntelligenceAgent.fallback(&ctx);
        match fallback.payload {
            FindingPayload::DataIntelligence { market_snapshot, .. } => {
                assert!(market_snapshot.get("stock_service").is_some());
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_macro_requires_regime() {
        let ctx = sample_context();
        assert!(MacroStrategistAgent.interpret(&json!({"outlook": "fine"}), &ctx).is_err());

        let opinion = MacroStrategistAgent
            .interpret(
                &json!({"market_regime": "bear_market", "regime_risk": 0.6, "stance": "hold"}),
                &ctx,
            )
            .unwrap();
        assert_eq!(opinion.payload.risk_signal(), Some(0.6));
    }
}
