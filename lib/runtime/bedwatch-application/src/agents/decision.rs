use tracing::debug;

use bedwatch_domain::{Forecast, RiskAssessment};

#[derive(Debug, Clone, Copy, Default)]
pub struct DecisionAgent;

impl DecisionAgent {
    pub fn decide(&self, forecast: &Forecast, total_beds: u32) -> RiskAssessment {
        let assessment = bedwatch_forecast::decide(forecast, total_beds);
        debug!(
            department = %forecast.department_id,
            forecast_id = %forecast.id,
            ratio = assessment.ratio,
            severity = %assessment.severity,
            "Risk evaluated"
        );
        assessment
    }
}
