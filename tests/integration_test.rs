#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use pawprofile::analysis::AnalysisResponse;
    use pawprofile::gateway::memory::Operation;
    use pawprofile::screen::MountOutcome;
    use pawprofile::{
        initialize, BusyState, Config, DialogAction, DialogKind, FilePicker,
        MemoryGateway, Navigator, Phase, PhotoFile, PiiRiskSummary,
        ProfileError, ProfileScreen, Result, RiskAnalyzer, Route, SaveOutcome,
        ScreenMode, User, PHOTO_BUCKET,
    };
    use rstest::rstest;
    use tokio::time::{sleep, Instant};

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    /// Answers after a fixed delay with a fixed response
    struct ScriptedAnalyzer {
        delay: Duration,
        risky: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RiskAnalyzer for ScriptedAnalyzer {
        async fn analyze(
            &self,
            user_id: &str,
            token: &str,
        ) -> Result<AnalysisResponse> {
            assert_eq!(user_id, "cat-1");
            assert_eq!(token, "access");
            self.calls.fetch_add(1, Ordering::SeqCst);
            sleep(self.delay).await;

            let pii_risk_summary = self.risky.then(|| PiiRiskSummary {
                score: 0.8,
                level: "high".into(),
                summary: "street sign".into(),
            });
            Ok(AnalysisResponse {
                summary: Some("A street sign is visible behind you.".into()),
                pii_risk_summary,
            })
        }
    }

    #[derive(Default)]
    struct RecordingNavigator {
        routes: Mutex<Vec<(Route, Instant)>>,
    }

    impl Navigator for RecordingNavigator {
        fn navigate(&self, route: Route) {
            self.routes
                .lock()
                .unwrap()
                .push((route, Instant::now()));
        }
    }

    #[derive(Default)]
    struct RecordingPicker {
        opened: AtomicUsize,
    }

    impl FilePicker for RecordingPicker {
        fn reset(&self) {}

        fn open(&self) {
            self.opened.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Harness {
        screen: Arc<ProfileScreen>,
        gateway: Arc<MemoryGateway>,
        analyzer: Arc<ScriptedAnalyzer>,
        navigator: Arc<RecordingNavigator>,
        picker: Arc<RecordingPicker>,
    }

    async fn mounted(analysis_ms: u64, risky: bool) -> Harness {
        initialize();
        let gateway = Arc::new(MemoryGateway::signed_in(
            User::new("cat-1"),
            "access",
        ));
        let analyzer = Arc::new(ScriptedAnalyzer {
            delay: Duration::from_millis(analysis_ms),
            risky,
            calls: AtomicUsize::new(0),
        });
        let navigator = Arc::new(RecordingNavigator::default());
        let picker = Arc::new(RecordingPicker::default());
        let screen = Arc::new(ProfileScreen::new(
            Config::default(),
            gateway.clone(),
            analyzer.clone(),
            navigator.clone(),
            picker.clone(),
        ));
        assert_eq!(
            screen.mount(ScreenMode::Create).await.unwrap(),
            MountOutcome::Ready
        );
        Harness {
            screen,
            gateway,
            analyzer,
            navigator,
            picker,
        }
    }

    async fn fill_in(h: &Harness) {
        h.screen.select_file().unwrap();
        h.screen
            .on_file_chosen(PhotoFile::new("whiskers.png", PNG.to_vec()))
            .await
            .unwrap();
        h.screen
            .edit_form(|form| {
                form.full_name = "Whiskers".into();
                form.work_as = "Mouser".into();
                form.looking_for = "Friendship".into();
                form.family_plan = "Not sure".into();
                form.relationship = "Single".into();
                form.contact_preference = "Texting".into();
                form.tagline = "Naps are a lifestyle".into();
                form.set_age(31);
            })
            .unwrap();
        h.screen.toggle_interest("Nature").unwrap();
    }

    fn dialog_kind(h: &Harness) -> Option<DialogKind> {
        h.screen.dialog().map(|d| d.kind)
    }

    #[tokio::test(start_paused = true)]
    async fn empty_form_shows_validation_and_writes_nothing() {
        let h = mounted(0, true).await;
        let writes_before = h.gateway.writes();

        let outcome = h.screen.save().await.unwrap();

        assert_eq!(outcome, SaveOutcome::Invalid);
        let dialog = h.screen.dialog().unwrap();
        assert_eq!(dialog.kind, DialogKind::Validation);
        assert!(dialog.details.contains(&"Photo is required".to_owned()));
        assert_eq!(h.gateway.writes(), writes_before);
        assert_eq!(h.analyzer.calls.load(Ordering::SeqCst), 0);

        h.screen.dismiss_validation().unwrap();
        assert_eq!(dialog_kind(&h), None);
    }

    #[rstest]
    #[case(true)]
    #[case(false)]
    #[tokio::test(start_paused = true)]
    async fn filled_form_saves_once_and_analyzes_once(#[case] risky: bool) {
        let h = mounted(800, risky).await;
        fill_in(&h).await;

        let outcome = h.screen.save().await.unwrap();

        assert_eq!(h.gateway.count(Operation::UpsertProfile), 1);
        assert_eq!(h.analyzer.calls.load(Ordering::SeqCst), 1);
        let stored = h.gateway.profile("cat-1").unwrap();
        assert_eq!(stored.full_name.as_deref(), Some("Whiskers"));
        assert_eq!(stored.age, Some(31));
        assert_eq!(stored.interests, Some(vec!["Nature".to_owned()]));

        if risky {
            assert_eq!(outcome, SaveOutcome::RiskConfirmed);
            assert_eq!(dialog_kind(&h), Some(DialogKind::RiskAlert));
        } else {
            assert_eq!(outcome, SaveOutcome::Clean);
            assert_eq!(dialog_kind(&h), None);
            assert_eq!(h.screen.busy(), BusyState::Idle);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn risk_dialog_waits_for_minimum_display() {
        let h = mounted(800, true).await;
        fill_in(&h).await;
        let start = Instant::now();

        let screen = h.screen.clone();
        let save = tokio::spawn(async move { screen.save().await });

        sleep(Duration::from_millis(1000)).await;
        assert_eq!(dialog_kind(&h), Some(DialogKind::Analyzing));
        assert_eq!(h.screen.busy(), BusyState::Analyzing);

        sleep(Duration::from_millis(3980)).await;
        assert_eq!(dialog_kind(&h), Some(DialogKind::Analyzing));

        let outcome = save.await.unwrap().unwrap();
        assert_eq!(outcome, SaveOutcome::RiskConfirmed);
        assert!(start.elapsed() >= Duration::from_millis(5000));
        assert_eq!(dialog_kind(&h), Some(DialogKind::RiskAlert));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_analysis_shows_risk_dialog_immediately() {
        let h = mounted(7000, true).await;
        fill_in(&h).await;
        let start = Instant::now();

        h.screen.save().await.unwrap();

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(7000));
        assert!(elapsed < Duration::from_millis(7010));
        assert_eq!(dialog_kind(&h), Some(DialogKind::RiskAlert));
    }

    #[tokio::test(start_paused = true)]
    async fn continue_anyway_navigates_after_redirect_delay() {
        let h = mounted(0, true).await;
        fill_in(&h).await;
        h.screen.save().await.unwrap();
        let dialog = h.screen.dialog().unwrap();
        assert!(dialog.actions.contains(&DialogAction::ContinueToDashboard));

        let start = Instant::now();
        let screen = h.screen.clone();
        let redirect =
            tokio::spawn(async move { screen.continue_anyway().await });

        sleep(Duration::from_millis(10)).await;
        assert_eq!(dialog_kind(&h), Some(DialogKind::Redirecting));
        assert!(h.navigator.routes.lock().unwrap().is_empty());
        assert!(matches!(
            h.screen.save().await,
            Err(ProfileError::Busy(Phase::Redirecting))
        ));

        redirect.await.unwrap().unwrap();
        let routes = h.navigator.routes.lock().unwrap().clone();
        assert_eq!(routes.len(), 1);
        let (route, at) = routes[0];
        assert_eq!(route, Route::Dashboard);
        let waited = at - start;
        assert!(waited >= Duration::from_millis(5000));
        assert!(waited < Duration::from_millis(5010));
        assert_eq!(h.screen.phase(), Phase::Done);
    }

    #[tokio::test(start_paused = true)]
    async fn change_photo_from_risk_alert_uploads_again() {
        let h = mounted(0, true).await;
        fill_in(&h).await;
        h.screen.save().await.unwrap();

        h.screen.change_photo().unwrap();
        assert_eq!(h.picker.opened.load(Ordering::SeqCst), 2);
        h.screen
            .on_file_chosen(PhotoFile::new("whiskers.png", PNG.to_vec()))
            .await
            .unwrap();

        assert_eq!(h.gateway.count(Operation::UploadObject), 2);
        assert_eq!(h.gateway.object_names(PHOTO_BUCKET).len(), 2);
        assert_eq!(h.gateway.photo_references("cat-1").len(), 1);
        assert!(h.navigator.routes.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_screen_cancels_analysis() {
        let h = mounted(3000, true).await;
        fill_in(&h).await;

        let screen = h.screen.clone();
        let save = tokio::spawn(async move { screen.save().await });
        sleep(Duration::from_millis(100)).await;
        h.screen.close();

        let result = save.await.unwrap();
        assert!(matches!(result, Err(ProfileError::Cancelled)));
        assert!(h.navigator.routes.lock().unwrap().is_empty());
    }
}
