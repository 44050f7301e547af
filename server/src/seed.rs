use products_crm::{Caller, Deal, NewDeal, PipelineEngine, PipelineResult, Stage, StageAction};
use tracing::info;

struct DemoDeal {
    title: &'static str,
    value_cents: i64,
    stage: Stage,
    close: Option<StageAction>,
}

fn demo_deals() -> Vec<DemoDeal> {
    vec![
        DemoDeal {
            title: "ACME warehouse scanners",
            value_cents: 1_250_000,
            stage: Stage::Lead,
            close: None,
        },
        DemoDeal {
            title: "Globex support renewal",
            value_cents: 480_000,
            stage: Stage::Qualified,
            close: None,
        },
        DemoDeal {
            title: "Initech fleet telematics",
            value_cents: 2_900_000,
            stage: Stage::Proposal,
            close: None,
        },
        DemoDeal {
            title: "Umbrella lab retrofit",
            value_cents: 6_400_000,
            stage: Stage::Negotiation,
            close: None,
        },
        DemoDeal {
            title: "Hooli onboarding package",
            value_cents: 350_000,
            stage: Stage::Negotiation,
            close: Some(StageAction::Won),
        },
        DemoDeal {
            title: "Vandelay import pilot",
            value_cents: 900_000,
            stage: Stage::Proposal,
            close: Some(StageAction::Lost {
                reason: Some("Chose a competitor".into()),
            }),
        },
    ]
}

/// Opens a small demo pipeline for `caller`, closing a couple of deals so
/// the analysis and forecast reports have something to show.
pub async fn seed_demo_pipeline(
    engine: &PipelineEngine,
    caller: Caller,
) -> PipelineResult<Vec<Deal>> {
    let mut seeded = Vec::new();
    for demo in demo_deals() {
        let deal = engine
            .open_deal(
                caller,
                NewDeal {
                    title: demo.title.to_string(),
                    value_cents: demo.value_cents,
                    currency: "USD".into(),
                    stage: Some(demo.stage),
                    assigned_to: None,
                },
            )
            .await?;
        let deal = match demo.close {
            Some(action) => engine.apply_action(caller, deal.id, action).await?,
            None => deal,
        };
        seeded.push(deal);
    }
    info!(owner_id = %caller.user_id, count = seeded.len(), "demo pipeline seeded");
    Ok(seeded)
}
