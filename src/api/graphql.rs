use std::collections::BTreeMap;
use std::sync::Arc;

use async_graphql::{Context, EmptySubscription, ErrorExtensions, Json, Object, Schema};

use crate::domain::attributes::{self, AttrValue};
use crate::domain::groups::{GroupRollup, StatusSnapshot};
use crate::domain::network::NetworkEntry;
use crate::domain::node::NodeAction;
use crate::domain::reconcile::Batch;
use crate::domain::service::{BulkResult, Family, FleetService, NodeIndex};
use crate::domain::update::{GroupChange, NodeUpdate};
use crate::error::FleetError;

pub type FleetSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

/// Message plus a `kind` extension matching the REST error body.
fn to_gql(err: FleetError) -> async_graphql::Error {
    let kind = serde_json::to_value(err.kind())
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    async_graphql::Error::new(err.to_string()).extend_with(|_, ext| ext.set("kind", kind))
}

async fn blocking<T, F>(ctx: &Context<'_>, op: F) -> async_graphql::Result<T>
where
    T: Send + 'static,
    F: FnOnce(&FleetService) -> Result<T, FleetError> + Send + 'static,
{
    let fleet = ctx.data::<Arc<FleetService>>()?.clone();
    tokio::task::spawn_blocking(move || op(fleet.as_ref()))
        .await
        .map_err(|e| async_graphql::Error::new(e.to_string()))?
        .map_err(to_gql)
}

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// Per-node class and per-group counts for dashboards.
    async fn status(&self, ctx: &Context<'_>) -> async_graphql::Result<Json<StatusSnapshot>> {
        let svc = ctx.data::<Arc<FleetService>>()?;
        Ok(Json(svc.status_snapshot()))
    }

    /// Group rollups keyed by group name.
    async fn groups(
        &self,
        ctx: &Context<'_>,
    ) -> async_graphql::Result<Json<BTreeMap<String, GroupRollup>>> {
        let svc = ctx.data::<Arc<FleetService>>()?;
        match svc.index(None, false) {
            NodeIndex::Fleet(index) => Ok(Json(index.groups)),
            _ => Ok(Json(BTreeMap::new())),
        }
    }

    async fn index(
        &self,
        ctx: &Context<'_>,
        role: Option<String>,
        #[graphql(default)] names_only: bool,
    ) -> async_graphql::Result<Json<NodeIndex>> {
        let svc = ctx.data::<Arc<FleetService>>()?;
        Ok(Json(svc.index(role.as_deref(), names_only)))
    }

    async fn families(
        &self,
        ctx: &Context<'_>,
    ) -> async_graphql::Result<Json<BTreeMap<String, Family>>> {
        let svc = ctx.data::<Arc<FleetService>>()?;
        Ok(Json(svc.families()))
    }

    /// Full node document, or one top-level key of it.
    async fn node(
        &self,
        ctx: &Context<'_>,
        name: String,
        key: Option<String>,
    ) -> async_graphql::Result<Json<serde_json::Value>> {
        let svc = ctx.data::<Arc<FleetService>>()?;
        svc.show(&name, key.as_deref()).map(Json).map_err(to_gql)
    }

    /// Slash-separated attribute path; empty returns the whole tree.
    async fn attribute(
        &self,
        ctx: &Context<'_>,
        name: String,
        #[graphql(default)] path: String,
    ) -> async_graphql::Result<Json<AttrValue>> {
        let svc = ctx.data::<Arc<FleetService>>()?;
        let segments = attributes::split_path(&path);
        svc.attribute(&name, &segments)
            .map(|found| Json(found.value))
            .map_err(to_gql)
    }

    async fn network(
        &self,
        ctx: &Context<'_>,
        name: String,
    ) -> async_graphql::Result<Json<Vec<NetworkEntry>>> {
        let svc = ctx.data::<Arc<FleetService>>()?;
        svc.network(&name).map(Json).map_err(to_gql)
    }
}

pub struct MutationRoot;

#[Object]
impl MutationRoot {
    /// Apply a batch of alias/public name/platform edits.
    async fn bulk_update(
        &self,
        ctx: &Context<'_>,
        batch: Json<Batch>,
    ) -> async_graphql::Result<Json<BulkResult>> {
        let batch = batch.0;
        blocking(ctx, move |svc| Ok(svc.reconcile_batch(&batch)))
            .await
            .map(Json)
    }

    async fn update_node(
        &self,
        ctx: &Context<'_>,
        name: String,
        update: Json<NodeUpdate>,
    ) -> async_graphql::Result<Json<crate::domain::node::Node>> {
        let update = update.0;
        blocking(ctx, move |svc| svc.update_one(&name, &update))
            .await
            .map(Json)
    }

    /// `group` of `automatic` returns the node to automatic grouping.
    async fn change_group(
        &self,
        ctx: &Context<'_>,
        node: String,
        group: String,
    ) -> async_graphql::Result<Json<GroupChange>> {
        blocking(ctx, move |svc| svc.change_group(&node, &group))
            .await
            .map(Json)
    }

    async fn hit(
        &self,
        ctx: &Context<'_>,
        node: String,
        action: String,
    ) -> async_graphql::Result<NodeAction> {
        blocking(ctx, move |svc| svc.hit(&node, &action)).await
    }
}

pub fn build_schema(fleet: Arc<FleetService>) -> FleetSchema {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .data(fleet)
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FleetSettings;
    use crate::domain::node::Node;
    use crate::domain::repository::MemoryNodeRepository;

    fn schema() -> FleetSchema {
        let mut node = Node::new("d52-54-00-00-00-01.example.com", "ready");
        node.attributes = AttrValue::from(serde_json::json!({"crowbar": {"network": "admin"}}));
        let repo = Arc::new(MemoryNodeRepository::new([node]));
        build_schema(Arc::new(FleetService::new(repo, FleetSettings::default())))
    }

    #[tokio::test]
    async fn attribute_query_resolves_path() {
        let res = schema()
            .execute(r#"{ attribute(name: "d52-54-00-00-00-01", path: "crowbar/network") }"#)
            .await;
        assert!(res.errors.is_empty(), "{:?}", res.errors);
        let data = res.data.into_json().unwrap();
        assert_eq!(data["attribute"], "admin");
    }

    #[tokio::test]
    async fn unknown_node_carries_kind() {
        let res = schema().execute(r#"{ network(name: "ghost") }"#).await;
        assert_eq!(res.errors.len(), 1);
        let ext = res.errors[0].extensions.as_ref().unwrap();
        assert_eq!(
            ext.get("kind"),
            Some(&async_graphql::Value::String("not_found".into()))
        );
    }

    #[tokio::test]
    async fn hit_rejects_unknown_action() {
        let res = schema()
            .execute(r#"mutation { hit(node: "d52-54-00-00-00-01", action: "explode") }"#)
            .await;
        assert_eq!(res.errors.len(), 1);
        assert!(res.errors[0].message.contains("explode"));
    }
}
