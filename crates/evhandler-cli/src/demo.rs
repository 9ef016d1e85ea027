//! `evhandler demo`: a guided tour of registration, ordering and removal.

use std::any::Any;
use std::sync::Arc;

use anyhow::Result;
use evhandler::{HandlerContext, Registry, RegistryConfig};
use parking_lot::Mutex;
use tracing::info;
use uuid::Uuid;

/// One line of demo output: which handler ran, for which device.
type Trace = Arc<Mutex<Vec<String>>>;

fn recorder(trace: Trace, label: &'static str) -> impl Fn(&HandlerContext, &dyn Any) + Send + Sync {
    move |ctx: &HandlerContext, args: &dyn Any| {
        let event = args.downcast_ref::<&str>().copied().unwrap_or("?");
        trace.lock().push(format!("{label:<10} event={event} target={}", ctx.target));
    }
}

pub fn run(config: RegistryConfig) -> Result<Vec<String>> {
    let registry = Registry::with_config(config)?;
    let trace: Trace = Arc::new(Mutex::new(Vec::new()));

    let disk = Uuid::now_v7();
    let ctx = HandlerContext::new(Uuid::nil(), disk);

    let audit = registry.register(None, "device.attach", recorder(trace.clone(), "audit"), ctx, 100)?;
    registry.register(None, "device.attach", recorder(trace.clone(), "driver"), ctx, -10)?;
    registry.register(None, "device.attach", recorder(trace.clone(), "mounter"), ctx, 0)?;
    registry.register(None, "device.attach", recorder(trace.clone(), "indexer"), ctx, 0)?;
    registry.register(None, "device.detach", recorder(trace.clone(), "cleanup"), ctx, 0)?;
    info!(lists = registry.len(), "demo handlers registered");

    registry.dispatch("device.attach", &"attach");
    trace.lock().push("-- audit handler deregistered --".into());
    registry.deregister("device.attach", Some(audit));
    registry.dispatch("device.attach", &"attach");
    registry.dispatch("device.detach", &"detach");

    for name in registry.list_names() {
        registry.deregister(&name, None);
    }
    registry.destroy();

    let lines = std::mem::take(&mut *trace.lock());
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_runs_in_priority_order() {
        let lines = run(RegistryConfig::default()).unwrap();
        let labels: Vec<&str> = lines
            .iter()
            .map(|l| l.split_whitespace().next().unwrap_or(""))
            .collect();
        assert_eq!(
            labels,
            vec![
                "driver", "mounter", "indexer", "audit", "--", "driver", "mounter", "indexer",
                "cleanup",
            ]
        );
    }
}
