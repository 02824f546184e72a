use super::{Context, print_json};

pub fn create(ctx: &Context, name: &str, space: &str, org: &str) -> anyhow::Result<()> {
    let app = ctx.service.create_app(name, space, org)?;
    print_json(&app)
}

pub fn list(ctx: &Context) -> anyhow::Result<()> {
    let apps = ctx.service.list_apps()?;
    if apps.is_empty() {
        println!("No apps.");
        return Ok(());
    }
    println!("{:<38} {:<24} {:<38}", "GUID", "NAME", "SPACE");
    for app in apps {
        println!("{:<38} {:<24} {:<38}", app.guid, app.name, app.space_guid);
    }
    Ok(())
}

pub fn delete(ctx: &Context, app_guid: &str) -> anyhow::Result<()> {
    ctx.service.delete_app(app_guid)?;
    println!("Deleted app {app_guid} and its processes.");
    Ok(())
}
