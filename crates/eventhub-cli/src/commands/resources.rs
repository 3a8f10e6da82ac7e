use std::fs;
use std::io::{self, Read};

use anyhow::{Context, Result};
use colored::Colorize;
use eventhub_client::resources::attach_image;
use eventhub_client::upload::DEFAULT_MAX_UPLOAD_BYTES;
use eventhub_client::{ApiClient, ListController, ListQuery, Resource, ResourceApi, require_section};
use serde_json::Value;

use crate::cli::{ListArgs, OutputFormat, ResourceCommands, WriteArgs};
use crate::output::{TableRow, print_item, print_page, print_success};

pub async fn run<T: Resource + TableRow>(
    client: &ApiClient,
    command: &ResourceCommands,
    format: OutputFormat,
) -> Result<()> {
    require_section(client.session(), T::SECTION)?;
    let api = ResourceApi::<T>::new(client.clone());

    match command {
        ResourceCommands::List(args) => {
            let controller = ListController::new(api);
            let query = build_query(args)?;
            if let Some(page) = controller.load(&query).await? {
                print_page(&page, format)?;
            }
        }
        ResourceCommands::Get(args) => {
            let item = api.get(&args.id).await?;
            print_item(&item, format)?;
        }
        ResourceCommands::Create(args) => {
            let body = read_body::<T>(args)?;
            let created = api.create(&body).await?;
            print_success(&format!("Created {} {}", T::SECTION, created.id().cyan()));
            print_item(&created, format)?;
        }
        ResourceCommands::Update(args) => {
            let body = read_body::<T>(&args.write)?;
            let updated = api.update(&args.id, &body).await?;
            print_success(&format!("Updated {} {}", T::SECTION, updated.id().cyan()));
            print_item(&updated, format)?;
        }
        ResourceCommands::Delete(args) => {
            api.delete(&args.id).await?;
            print_success(&format!("Deleted {} {}", T::SECTION, args.id.cyan()));
        }
    }
    Ok(())
}

fn build_query(args: &ListArgs) -> Result<ListQuery> {
    let mut query = ListQuery::new().page(args.page).limit(args.limit);
    if let Some(search) = &args.search {
        query = query.search(search.as_str());
    }
    for raw in &args.filters {
        let (key, value) = raw
            .split_once('=')
            .with_context(|| format!("Invalid filter \"{raw}\". Expected key=value"))?;
        if key.is_empty() {
            anyhow::bail!("Invalid filter \"{raw}\". Expected key=value");
        }
        query = query.filter(key, value);
    }
    Ok(query)
}

fn read_body<T: Resource>(args: &WriteArgs) -> Result<Value> {
    let content = match &args.file {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("Failed to read file: {path}"))?
        }
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read from stdin")?;
            buf
        }
    };
    let mut body: Value = serde_json::from_str(&content).context("Invalid JSON")?;
    if let Some(image) = &args.image {
        attach_image::<T>(&mut body, image, DEFAULT_MAX_UPLOAD_BYTES)
            .with_context(|| format!("Failed to attach image {}", image.display()))?;
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventhub_client::Event;

    fn list_args(filters: &[&str]) -> ListArgs {
        ListArgs {
            page: 3,
            limit: 20,
            search: Some("meetup".to_string()),
            filters: filters.iter().map(|f| f.to_string()).collect(),
        }
    }

    #[test]
    fn query_from_args() {
        let query = build_query(&list_args(&["status=published", "city=Berlin=Mitte"])).unwrap();
        assert_eq!(query.page, 3);
        assert_eq!(query.limit, 20);
        assert_eq!(query.search.as_deref(), Some("meetup"));
        assert_eq!(query.filters["status"], "published");
        assert_eq!(query.filters["city"], "Berlin=Mitte");
    }

    #[test]
    fn malformed_filters_are_rejected() {
        assert!(build_query(&list_args(&["status"])).is_err());
        assert!(build_query(&list_args(&["=x"])).is_err());
    }

    #[test]
    fn body_with_image() {
        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("event.json");
        let image_path = dir.path().join("cover.jpg");
        fs::write(&json_path, r#"{ "title": "RustConf" }"#).unwrap();
        fs::write(&image_path, b"jpg").unwrap();

        let body = read_body::<Event>(&WriteArgs {
            file: Some(json_path.display().to_string()),
            image: Some(image_path),
        })
        .unwrap();
        assert_eq!(body["title"], "RustConf");
        assert_eq!(body["coverImage"], "data:image/jpeg;base64,anBn");
    }
}
