mod nodes;

use async_graphql::{Context, EmptySubscription, ErrorExtensions, ID, Object, Schema};
use platform_api::{ApiError, internal_error, pipeline_error};
use products_crm::{Caller, NewDeal, PipelineEngine, StageAction, pipeline_stages};
use tracing::instrument;
use uuid::Uuid;

pub use nodes::{
    DealNode, DealStageAction, DealStageHistoryNode, OpenDealInput, PipelineStage,
    RevenueForecastNode, WinLossAnalysis,
};

pub type SchemaType = Schema<QueryRoot, MutationRoot, EmptySubscription>;

pub fn build_schema(engine: PipelineEngine) -> SchemaType {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .data(engine)
        .finish()
}

#[derive(Default)]
pub struct QueryRoot;

#[derive(Default)]
pub struct MutationRoot;

#[Object]
impl QueryRoot {
    #[instrument(name = "graphql.deal", skip_all)]
    async fn deal(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<DealNode> {
        let caller = require_caller(ctx)?;
        let deal_id = parse_id(&id)?;
        let deal = engine(ctx)?
            .get_deal(caller, deal_id)
            .await
            .map_err(pipeline_error)?;
        Ok(deal.into())
    }

    #[instrument(name = "graphql.deals", skip_all)]
    async fn deals(&self, ctx: &Context<'_>) -> async_graphql::Result<Vec<DealNode>> {
        let caller = require_caller(ctx)?;
        let deals = engine(ctx)?
            .list_deals(caller)
            .await
            .map_err(pipeline_error)?;
        Ok(deals.into_iter().map(DealNode::from).collect())
    }

    #[graphql(name = "dealStageHistory")]
    async fn deal_stage_history(
        &self,
        ctx: &Context<'_>,
        #[graphql(name = "dealId")] deal_id: ID,
    ) -> async_graphql::Result<Vec<DealStageHistoryNode>> {
        let caller = require_caller(ctx)?;
        let deal_id = parse_id(&deal_id)?;
        let history = engine(ctx)?
            .stage_history(caller, deal_id)
            .await
            .map_err(pipeline_error)?;
        Ok(history.into_iter().map(Into::into).collect())
    }

    #[graphql(name = "pipelineStages")]
    async fn pipeline_stages(&self) -> Vec<PipelineStage> {
        pipeline_stages().into_iter().map(Into::into).collect()
    }

    #[graphql(name = "winLossAnalysis")]
    #[instrument(name = "graphql.winLossAnalysis", skip_all)]
    async fn win_loss_analysis(&self, ctx: &Context<'_>) -> async_graphql::Result<WinLossAnalysis> {
        let caller = require_caller(ctx)?;
        let report = engine(ctx)?
            .win_loss_analysis(caller)
            .await
            .map_err(pipeline_error)?;
        Ok(report.into())
    }

    #[graphql(name = "revenueForecast")]
    #[instrument(name = "graphql.revenueForecast", skip_all)]
    async fn revenue_forecast(
        &self,
        ctx: &Context<'_>,
    ) -> async_graphql::Result<RevenueForecastNode> {
        let caller = require_caller(ctx)?;
        let forecast = engine(ctx)?
            .revenue_forecast(caller)
            .await
            .map_err(pipeline_error)?;
        Ok(forecast.into())
    }
}

#[Object]
impl MutationRoot {
    #[graphql(name = "openDeal")]
    #[instrument(name = "graphql.openDeal", skip_all)]
    async fn open_deal(
        &self,
        ctx: &Context<'_>,
        input: OpenDealInput,
    ) -> async_graphql::Result<DealNode> {
        let caller = require_caller(ctx)?;
        let assigned_to = input.assigned_to.as_ref().map(parse_id).transpose()?;
        let new_deal = NewDeal {
            title: input.title,
            value_cents: input.value_cents,
            currency: input.currency,
            stage: input.stage.map(Into::into),
            assigned_to,
        };
        let deal = engine(ctx)?
            .open_deal(caller, new_deal)
            .await
            .map_err(pipeline_error)?;
        Ok(deal.into())
    }

    #[graphql(name = "moveDealStage")]
    #[instrument(name = "graphql.moveDealStage", skip_all)]
    async fn move_deal_stage(
        &self,
        ctx: &Context<'_>,
        id: ID,
        action: DealStageAction,
        #[graphql(name = "lostReason")] lost_reason: Option<String>,
    ) -> async_graphql::Result<DealNode> {
        let caller = require_caller(ctx)?;
        let deal_id = parse_id(&id)?;
        let action = match action {
            DealStageAction::Next => StageAction::Next,
            DealStageAction::Won => StageAction::Won,
            DealStageAction::Lost => StageAction::Lost {
                reason: lost_reason,
            },
        };
        let deal = engine(ctx)?
            .apply_action(caller, deal_id, action)
            .await
            .map_err(pipeline_error)?;
        Ok(deal.into())
    }
}

fn engine<'a>(ctx: &Context<'a>) -> async_graphql::Result<&'a PipelineEngine> {
    ctx.data::<PipelineEngine>()
        .map_err(|_| internal_error(anyhow::anyhow!("missing pipeline engine")))
}

fn require_caller(ctx: &Context<'_>) -> async_graphql::Result<Caller> {
    ctx.data_opt::<Caller>()
        .copied()
        .ok_or_else(|| ApiError::Unauthorized.extend())
}

fn parse_id(id: &ID) -> async_graphql::Result<Uuid> {
    Uuid::parse_str(id.as_str())
        .map_err(|_| ApiError::InvalidInput("invalid id".into()).extend())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use async_graphql::{Request, Variables};
    use products_crm::MemoryDealStore;
    use serde_json::json;

    fn schema() -> SchemaType {
        build_schema(PipelineEngine::new(Arc::new(MemoryDealStore::new())))
    }

    async fn open_deal(schema: &SchemaType, caller: Caller, stage: &str) -> String {
        let mutation = r#"
            mutation Open($input: OpenDealInput!) {
                openDeal(input: $input) { id stage outcome }
            }
        "#;
        let request = Request::new(mutation)
            .variables(Variables::from_json(json!({
                "input": {
                    "title": "Fleet telematics",
                    "valueCents": 10000,
                    "currency": "USD",
                    "stage": stage
                }
            })))
            .data(caller);
        let resp = schema.execute(request).await;
        assert!(resp.errors.is_empty(), "errors: {:?}", resp.errors);
        resp.data.into_json().unwrap()["openDeal"]["id"]
            .as_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn pipeline_stages_are_public() {
        let resp = schema()
            .execute(Request::new(
                "{ pipelineStages { key probability sortOrder } }",
            ))
            .await;
        assert!(resp.errors.is_empty(), "errors: {:?}", resp.errors);
        let stages = resp.data.into_json().unwrap()["pipelineStages"].clone();
        assert_eq!(stages.as_array().unwrap().len(), 4);
        assert_eq!(stages[0]["key"], "LEAD");
        assert_eq!(stages[3]["key"], "NEGOTIATION");
        assert_eq!(stages[3]["probability"], 70);
    }

    #[tokio::test]
    async fn reports_require_a_caller() {
        let resp = schema()
            .execute(Request::new("{ winLossAnalysis { winRate } }"))
            .await;
        assert_eq!(resp.errors.len(), 1);
        let code = resp.errors[0]
            .extensions
            .as_ref()
            .and_then(|map| map.get("code"))
            .cloned();
        assert_eq!(code, Some(async_graphql::Value::from("UNAUTHORIZED")));
    }

    #[tokio::test]
    async fn schema_without_engine_reports_masked_internal_error() {
        let bare: SchemaType = Schema::build(QueryRoot, MutationRoot, EmptySubscription).finish();
        let resp = bare
            .execute(Request::new("{ deals { id } }").data(Caller::new(Uuid::new_v4())))
            .await;
        assert_eq!(resp.errors.len(), 1);
        assert_eq!(resp.errors[0].message, "internal server error");
        let code = resp.errors[0]
            .extensions
            .as_ref()
            .and_then(|map| map.get("code"))
            .cloned();
        assert_eq!(code, Some(async_graphql::Value::from("INTERNAL")));
    }

    #[tokio::test]
    async fn move_deal_stage_advances_and_rejects_closed() {
        let schema = schema();
        let caller = Caller::new(Uuid::new_v4());
        let id = open_deal(&schema, caller, "PROPOSAL").await;
        let mutation = r#"
            mutation Move($id: ID!, $action: DealStageAction!) {
                moveDealStage(id: $id, action: $action) { stage outcome closedAt }
            }
        "#;

        let next = schema
            .execute(
                Request::new(mutation)
                    .variables(Variables::from_json(json!({ "id": id, "action": "NEXT" })))
                    .data(caller),
            )
            .await;
        assert!(next.errors.is_empty(), "errors: {:?}", next.errors);
        let moved = next.data.into_json().unwrap()["moveDealStage"].clone();
        assert_eq!(moved["stage"], "NEGOTIATION");
        assert_eq!(moved["outcome"], "OPEN");

        let won = schema
            .execute(
                Request::new(mutation)
                    .variables(Variables::from_json(json!({ "id": id, "action": "WON" })))
                    .data(caller),
            )
            .await;
        assert!(won.errors.is_empty(), "errors: {:?}", won.errors);

        let again = schema
            .execute(
                Request::new(mutation)
                    .variables(Variables::from_json(json!({ "id": id, "action": "NEXT" })))
                    .data(caller),
            )
            .await;
        assert_eq!(again.errors.len(), 1);
        let code = again.errors[0]
            .extensions
            .as_ref()
            .and_then(|map| map.get("code"))
            .cloned();
        assert_eq!(code, Some(async_graphql::Value::from("INVALID_STATE")));
    }

    #[tokio::test]
    async fn forecast_query_weights_open_deals() {
        let schema = schema();
        let caller = Caller::new(Uuid::new_v4());
        open_deal(&schema, caller, "PROPOSAL").await;
        let resp = schema
            .execute(
                Request::new(
                    "{ revenueForecast { openDealCount pipelineTotalCents weightedTotalCents } }",
                )
                .data(caller),
            )
            .await;
        assert!(resp.errors.is_empty(), "errors: {:?}", resp.errors);
        let forecast = resp.data.into_json().unwrap()["revenueForecast"].clone();
        assert_eq!(forecast["openDealCount"], 1);
        assert_eq!(forecast["pipelineTotalCents"], 10000);
        assert_eq!(forecast["weightedTotalCents"], 5000);
    }
}
