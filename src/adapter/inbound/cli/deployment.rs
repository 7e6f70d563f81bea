//! Handlers for `uc-deploy deployment ...`.

use std::time::Duration;

use serde_json::json;

use super::command::{CheckArgs, DeleteArgs, DeployArgs, DeploymentCommand, ReviveArgs};
use super::output::Output;
use crate::application::deployment::{DeployRequest, DeploymentService};
use crate::application::watcher::ReadinessOutcome;
use crate::error::Result;

/// Dispatch a deployment subcommand.
pub async fn execute(out: Output, service: &DeploymentService, command: DeploymentCommand) -> Result<()> {
    match command {
        DeploymentCommand::List => {
            out.deployments(&service.list().await?);
            Ok(())
        }
        DeploymentCommand::Deploy(args) => deploy(out, service, args).await,
        DeploymentCommand::Revive(args) => revive(out, service, args).await,
        DeploymentCommand::Delete(args) => delete(out, service, args).await,
        DeploymentCommand::Check(args) => check(out, service, args).await,
    }
}

async fn deploy(out: Output, service: &DeploymentService, args: DeployArgs) -> Result<()> {
    let request = DeployRequest {
        name: args.deployment_name,
        suffix: args.deployment_name_suffix,
        force: args.force,
        skip_build: args.skip_build,
        reset_lock: args.reset_lock,
        use_sudo: args.use_sudo,
    };

    let progress = out.progress("Deploying user code...");
    let outcome = match service.deploy(&request).await {
        Ok(outcome) => outcome,
        Err(e) => {
            progress.fail("Deployment failed");
            return Err(e);
        }
    };
    progress.finish(&format!("Reconciled {} ({})", outcome.name, outcome.plan.state));
    out.field("Deployment", out.highlight(&outcome.name));
    out.field("Tag", &outcome.tag);
    if let Some(url) = &outcome.assets_url {
        out.field("Assets", url);
    }

    out.section("Status");
    let observation = service
        .watch(&outcome.name, outcome.plan.readiness_timeout, |pod, line| {
            out.log_line(pod, line)
        })
        .await;
    out.observation(&observation);

    out.report(json!({
        "command": "deployment.deploy",
        "name": outcome.name.to_string(),
        "tag": outcome.tag.to_string(),
        "state": outcome.plan.state.to_string(),
        "assets_url": outcome.assets_url,
        "ready": observation.readiness == ReadinessOutcome::Ready,
    }));
    Ok(())
}

async fn revive(out: Output, service: &DeploymentService, args: ReviveArgs) -> Result<()> {
    let progress = out.progress(&format!("Reviving {}:{}...", args.name, args.tag));
    let plan = match service.revive(&args.name, &args.tag).await {
        Ok(plan) => plan,
        Err(e) => {
            progress.fail("Revive failed");
            return Err(e);
        }
    };
    progress.finish(&format!("Revived {} ({})", args.name, plan.state));

    out.report(json!({
        "command": "deployment.revive",
        "name": args.name,
        "tag": args.tag,
        "state": plan.state.to_string(),
    }));
    Ok(())
}

async fn delete(out: Output, service: &DeploymentService, args: DeleteArgs) -> Result<()> {
    if args.all {
        let outcome = service.delete_all().await?;
        out.done(&format!(
            "Deleted {} deployments ({} objects)",
            outcome.records_removed, outcome.resources_removed
        ));
        out.report(json!({
            "command": "deployment.delete",
            "all": true,
            "records_removed": outcome.records_removed,
            "resources_removed": outcome.resources_removed,
        }));
        return Ok(());
    }

    let (name, registered) = service.delete(args.name.as_deref()).await?;
    if !registered {
        out.warning(&format!("Deployment \"{name}\" was not registered"));
    }
    out.done(&format!("Deleted {name}"));
    out.report(json!({
        "command": "deployment.delete",
        "name": name.to_string(),
        "registered": registered,
    }));
    Ok(())
}

async fn check(out: Output, service: &DeploymentService, args: CheckArgs) -> Result<()> {
    let report = service
        .check(
            args.name.as_deref(),
            Duration::from_secs(args.timeout),
            |pod, line| out.log_line(pod, line),
        )
        .await?;

    if !report.registered {
        out.warning(&format!(
            "Deployment \"{}\" is not registered; see `uc-deploy deployment list`",
            report.name
        ));
    }
    out.logs(&report.logs);
    out.report(json!({
        "command": "deployment.check",
        "name": report.name.to_string(),
        "registered": report.registered,
        "pods": report.pods,
    }));
    Ok(())
}
