/*!
Horloge manuelle pour tests déterministes

`sleep` ne bloque pas: il avance le temps virtuel, enregistre la durée et
appelle un hook optionnel (utile pour annuler la boucle à un moment précis).
*/

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Local, TimeZone};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use symbion_healer::Clock;

type SleepHook = Arc<dyn Fn(Duration, usize) + Send + Sync>;

#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Local>>>,
    sleeps: Arc<Mutex<Vec<Duration>>>,
    hook: Option<SleepHook>,
}

impl ManualClock {
    pub fn new() -> Self {
        let start = Local
            .with_ymd_and_hms(2026, 1, 15, 8, 0, 0)
            .single()
            .unwrap_or_else(Local::now);
        Self {
            now: Arc::new(Mutex::new(start)),
            sleeps: Arc::new(Mutex::new(Vec::new())),
            hook: None,
        }
    }

    /// Hook appelé à chaque sleep avec (durée, nombre de sleeps de cette durée)
    pub fn with_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(Duration, usize) + Send + Sync + 'static,
    {
        self.hook = Some(Arc::new(hook));
        self
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }

    pub fn count_sleeps(&self, duration: Duration) -> usize {
        self.sleeps.lock().iter().filter(|d| **d == duration).count()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        *self.now.lock()
    }

    async fn sleep(&self, duration: Duration) {
        let count = {
            let mut sleeps = self.sleeps.lock();
            sleeps.push(duration);
            sleeps.iter().filter(|d| **d == duration).count()
        };
        {
            let mut now = self.now.lock();
            *now += ChronoDuration::from_std(duration).unwrap_or_else(|_| ChronoDuration::zero());
        }
        if let Some(hook) = &self.hook {
            hook(duration, count);
        }
        tokio::task::yield_now().await;
    }
}
