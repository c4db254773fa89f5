use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{seq::SliceRandom, thread_rng, Rng};
use serde_json::{json, Value};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use trip_planner::cache::{CacheConfig, ExpiringCache};
use trip_planner::gateway::{places_key, weather_key};
use trip_planner::models::PlaceType;

// Mixed read/write load on the provider cache at different capacities
pub fn cache_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("provider_cache");

    let cities = ["Beijing", "Shanghai", "Tokyo", "Paris", "Lima", "Oslo", "Cairo", "Seoul"];
    let kinds = [PlaceType::TouristAttraction, PlaceType::Restaurant, PlaceType::Hotel];
    let mut keys: Vec<String> = cities.iter().map(|c| weather_key(c)).collect();
    for city in cities {
        for kind in kinds {
            keys.push(places_key(city, kind));
        }
    }
    // Extra keys so the smaller capacities see evictions
    keys.extend((0..200).map(|i| format!("translate:phrase{i}:EN")));

    for max_size in [16usize, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(max_size), &max_size, |b, &max_size| {
            b.iter(|| {
                let cache: Arc<ExpiringCache<Value>> = Arc::new(
                    ExpiringCache::new(CacheConfig {
                        max_size,
                        ttl: Duration::from_secs(3600),
                    })
                    .unwrap(),
                );

                let mut handles = vec![];
                for _ in 0..4 {
                    let cache = Arc::clone(&cache);
                    let keys = keys.clone();

                    handles.push(thread::spawn(move || {
                        let mut rng = thread_rng();
                        for _ in 0..250 {
                            let key = keys.choose(&mut rng).unwrap();
                            if rng.gen_bool(0.3) {
                                // 30% writes
                                cache.set(key.clone(), json!({ "name": key, "rating": 4.5 }));
                            } else {
                                // 70% reads
                                let _ = cache.get(key);
                            }
                        }
                    }));
                }

                for handle in handles {
                    handle.join().unwrap();
                }

                black_box(cache.stats())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, cache_benchmark);
criterion_main!(benches);
