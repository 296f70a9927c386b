/// Reminder Scanner
/// Periodically looks for reminders that are about to fall due and hands
/// them to a notifier. The loop lives as long as its `ScannerHandle`.
use crate::config::SCANNER_UPCOMING_WINDOW_MINUTES;
use crate::error::Result;
use crate::models::{now_millis, ReminderRecord};
use crate::services::queries;
use crate::services::RemindersService;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Delivers reminder notifications to the user
pub trait ReminderNotifier: Send + Sync {
    fn notify(&self, reminder: &ReminderRecord) -> Result<()>;
}

/// Notifier that only writes to the log
pub struct LogNotifier;

impl ReminderNotifier for LogNotifier {
    fn notify(&self, reminder: &ReminderRecord) -> Result<()> {
        tracing::info!(
            "Reminder due: {} ({}) at {}",
            reminder.title,
            reminder.id,
            reminder.reminder_time
        );
        Ok(())
    }
}

/// Scanner for upcoming reminders
pub struct ReminderScanner {
    reminders: RemindersService,
    notifier: Arc<dyn ReminderNotifier>,
    interval: Duration,
    window_minutes: i64,
    /// (id, due time) pairs already announced
    notified: HashSet<(String, i64)>,
}

impl ReminderScanner {
    pub fn new(
        reminders: RemindersService,
        notifier: Arc<dyn ReminderNotifier>,
        interval: Duration,
    ) -> Self {
        Self {
            reminders,
            notifier,
            interval,
            window_minutes: SCANNER_UPCOMING_WINDOW_MINUTES,
            notified: HashSet::new(),
        }
    }

    pub fn with_window(mut self, window_minutes: i64) -> Self {
        self.window_minutes = window_minutes;
        self
    }

    /// Run one scan against the current time
    pub async fn scan_once(&mut self) -> Result<usize> {
        self.scan_at(now_millis()).await
    }

    /// Notify every upcoming reminder not yet announced for its due time
    ///
    /// Returns the number of notifications delivered.
    pub async fn scan_at(&mut self, now: i64) -> Result<usize> {
        let snapshot = self.reminders.list_all().await?;
        let due = queries::upcoming(&snapshot, now, self.window_minutes);

        let mut delivered = 0;
        for reminder in &due {
            let key = (reminder.id.clone(), reminder.reminder_time);
            if self.notified.contains(&key) {
                continue;
            }

            match self.notifier.notify(reminder) {
                Ok(()) => {
                    self.notified.insert(key);
                    delivered += 1;
                }
                Err(e) => {
                    tracing::warn!("Failed to notify reminder {}: {}", reminder.id, e)
                }
            }
        }

        // Forget reminders that left the window so the set stays small
        let current: HashSet<(String, i64)> = due
            .into_iter()
            .map(|r| (r.id, r.reminder_time))
            .collect();
        self.notified.retain(|key| current.contains(key));

        Ok(delivered)
    }

    /// Start the background loop
    pub fn spawn(mut self) -> ScannerHandle {
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            tracing::info!("Starting reminder scanner (every {:?})", self.interval);

            let mut interval = tokio::time::interval(self.interval);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = self.scan_once().await {
                            tracing::error!("Error checking reminders: {}", e);
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::info!("Reminder scanner stopped");
        });

        ScannerHandle { shutdown, task }
    }
}

/// Owner of a running scanner; dropping it also stops the loop
pub struct ScannerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ScannerHandle {
    /// Stop the loop and wait for it to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!("Reminder scanner ended abnormally: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::ReminderDraft;
    use crate::storage::RecordStore;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const MINUTE: i64 = 60 * 1000;

    #[derive(Default)]
    struct RecordingNotifier {
        seen: Mutex<Vec<String>>,
        fail: bool,
    }

    impl ReminderNotifier for RecordingNotifier {
        fn notify(&self, reminder: &ReminderRecord) -> Result<()> {
            if self.fail {
                return Err(AppError::Generic("notification channel closed".to_string()));
            }
            self.seen.lock().unwrap().push(reminder.title.clone());
            Ok(())
        }
    }

    async fn create_test_service() -> (RemindersService, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let service = RemindersService::new(RecordStore::new(
            temp_dir.path().join("reminders"),
            "reminder",
        ));
        service.initialize().await.unwrap();
        (service, temp_dir)
    }

    #[tokio::test]
    async fn test_scan_notifies_upcoming_once() {
        let (service, _temp) = create_test_service().await;
        let now = now_millis();
        service
            .create(ReminderDraft::new("soon", "", now + 2 * MINUTE))
            .await
            .unwrap();
        service
            .create(ReminderDraft::new("later", "", now + 30 * MINUTE))
            .await
            .unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let mut scanner =
            ReminderScanner::new(service, notifier.clone(), Duration::from_secs(30));

        assert_eq!(scanner.scan_at(now).await.unwrap(), 1);
        assert_eq!(scanner.scan_at(now + 1000).await.unwrap(), 0);
        assert_eq!(*notifier.seen.lock().unwrap(), vec!["soon"]);
    }

    #[tokio::test]
    async fn test_rescheduled_reminder_is_notified_again() {
        let (service, _temp) = create_test_service().await;
        let now = now_millis();
        let mut reminder = service
            .create(ReminderDraft::new("move me", "", now + MINUTE))
            .await
            .unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let mut scanner =
            ReminderScanner::new(service.clone(), notifier.clone(), Duration::from_secs(30));
        scanner.scan_at(now).await.unwrap();

        reminder.reminder_time = now + 3 * MINUTE;
        service.save(&reminder).await.unwrap();

        assert_eq!(scanner.scan_at(now).await.unwrap(), 1);
        assert_eq!(notifier.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_notification_is_retried() {
        let (service, _temp) = create_test_service().await;
        let now = now_millis();
        service
            .create(ReminderDraft::new("soon", "", now + MINUTE))
            .await
            .unwrap();

        let failing = Arc::new(RecordingNotifier {
            fail: true,
            ..RecordingNotifier::default()
        });
        let mut scanner = ReminderScanner::new(service, failing, Duration::from_secs(30));

        assert_eq!(scanner.scan_at(now).await.unwrap(), 0);
        assert!(scanner.notified.is_empty());
    }

    #[tokio::test]
    async fn test_completed_reminders_are_ignored() {
        let (service, _temp) = create_test_service().await;
        let now = now_millis();
        let reminder = service
            .create(ReminderDraft::new("done", "", now + MINUTE))
            .await
            .unwrap();
        service.mark_completed(&reminder.id).await.unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let mut scanner = ReminderScanner::new(service, notifier, Duration::from_secs(30));

        assert_eq!(scanner.scan_at(now).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_spawned_scanner_runs_and_shuts_down() {
        let (service, _temp) = create_test_service().await;
        service
            .create(ReminderDraft::new("soon", "", now_millis() + MINUTE))
            .await
            .unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let handle = ReminderScanner::new(service, notifier.clone(), Duration::from_millis(20))
            .spawn();

        for _ in 0..100 {
            if !notifier.seen.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(*notifier.seen.lock().unwrap(), vec!["soon"]);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_dropping_handle_stops_scanner() {
        let (service, _temp) = create_test_service().await;
        let notifier: Arc<dyn ReminderNotifier> = Arc::new(LogNotifier);
        let handle = ReminderScanner::new(service, notifier, Duration::from_millis(10)).spawn();

        let ScannerHandle { shutdown, task } = handle;
        drop(shutdown);

        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("scanner did not stop")
            .unwrap();
    }
}
