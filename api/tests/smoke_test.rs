use crate::common::{json, run_app_test};

#[tokio::test]
async fn smoke_test() {
    run_app_test(|app| async move {
        let response = app.client.get("health").send().await?;

        assert_eq!(
            response.status().as_u16(),
            200,
            "response status code should be 200"
        );

        let body = json(response).await?;
        assert_eq!(body["healthy"], true);
        assert_eq!(body["database"], true);
        assert_eq!(body["workers"], 2);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn health_reports_store_outage() {
    run_app_test(|app| async move {
        app.store.set_offline(true);

        let response = app.client.get("health").send().await?;
        assert_eq!(response.status().as_u16(), 503);
        let body = json(response).await?;
        assert_eq!(body["healthy"], false);
        assert_eq!(body["database"], false);

        let response = app.alice.get("images").send().await?;
        assert_eq!(response.status().as_u16(), 503);

        app.store.set_offline(false);
        let response = app.alice.get("images").send().await?;
        assert_eq!(response.status().as_u16(), 200);
        Ok(())
    })
    .await
}
