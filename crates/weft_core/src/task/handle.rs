// handle.rs - Task handles, dependency graph and submission
//
// Submitting a task walks its dependency graph depth first and runs every
// task in it exactly once, dependencies before dependents. Each task's
// slices go through the work queue and are awaited before the next task
// starts, with the submitting thread helping to drain the queue. Slices
// point straight into archetype chunks; that is sound because submission
// holds the `&mut ArchetypeManager` borrow until every slice has finished.

use crate::ecs::{Archetype, ArchetypeManager};
use crate::task::{
    custom_ranges, stride_ranges, ComponentSet, CustomParallelTask, ParallelTask,
    ParallelTaskWithIndex, SingleTask, TaskKind,
};
use crate::work::{CompletionLatch, Job, WorkError, WorkManager};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task '{task}' is part of a dependency cycle")]
    DependencyCycle { task: String },

    #[error("failed to queue work for task '{task}': {source}")]
    Work {
        task: String,
        #[source]
        source: WorkError,
    },

    #[error("{count} slice(s) of task '{task}' panicked")]
    SlicePanicked { task: String, count: usize },
}

/// Decomposes a task body into jobs for one submission.
trait Schedule: Send + Sync {
    fn kind(&self) -> TaskKind;

    fn slices(&self, archetypes: &mut ArchetypeManager, settings: SliceSettings) -> Vec<Job>;
}

#[derive(Copy, Clone)]
struct SliceSettings {
    iterations_per_stride: usize,
    splits: usize,
}

struct SingleBody<T>(Arc<T>);

impl<T: SingleTask> Schedule for SingleBody<T> {
    fn kind(&self) -> TaskKind {
        TaskKind::Single
    }

    fn slices(&self, _: &mut ArchetypeManager, _: SliceSettings) -> Vec<Job> {
        let task = self.0.clone();
        let job: Job = Box::new(move || task.execute());
        vec![job]
    }
}

struct CustomBody<T>(Arc<T>);

impl<T: CustomParallelTask> Schedule for CustomBody<T> {
    fn kind(&self) -> TaskKind {
        TaskKind::CustomParallel
    }

    fn slices(&self, _: &mut ArchetypeManager, settings: SliceSettings) -> Vec<Job> {
        custom_ranges(self.0.iterations(), settings.splits)
            .into_iter()
            .map(|range| {
                let task = self.0.clone();
                Box::new(move || range.for_each(|i| task.execute(i))) as Job
            })
            .collect()
    }
}

/// Parallel bodies differ only in how a row is handed to user code.
trait RowVisitor: Send + Sync + 'static {
    type Components: ComponentSet;
    const KIND: TaskKind;

    fn visit(&self, index: usize, columns: <Self::Components as ComponentSet>::Columns);
}

struct PerRow<T>(T);

impl<T: ParallelTask> RowVisitor for PerRow<T> {
    type Components = T::Components;
    const KIND: TaskKind = TaskKind::Parallel;

    #[inline]
    fn visit(&self, index: usize, columns: <Self::Components as ComponentSet>::Columns) {
        // SAFETY: the slice owns `index` exclusively.
        self.0.execute(unsafe { <T::Components as ComponentSet>::fetch(columns, index) });
    }
}

struct PerRowIndexed<T>(T);

impl<T: ParallelTaskWithIndex> RowVisitor for PerRowIndexed<T> {
    type Components = T::Components;
    const KIND: TaskKind = TaskKind::ParallelWithIndex;

    #[inline]
    fn visit(&self, index: usize, columns: <Self::Components as ComponentSet>::Columns) {
        // SAFETY: the slice owns `index` exclusively.
        self.0.execute(index, unsafe { <T::Components as ComponentSet>::fetch(columns, index) });
    }
}

struct ParallelBody<V>(Arc<V>);

impl<V: RowVisitor> Schedule for ParallelBody<V> {
    fn kind(&self) -> TaskKind {
        V::KIND
    }

    fn slices(&self, archetypes: &mut ArchetypeManager, settings: SliceSettings) -> Vec<Job> {
        let mut jobs = Vec::new();
        for archetype in archetypes.archetypes_mut() {
            if archetype.is_empty() || !<V::Components as ComponentSet>::matches(archetype) {
                continue;
            }
            self.slice_archetype(archetype, settings.iterations_per_stride, &mut jobs);
        }
        jobs
    }
}

impl<V: RowVisitor> ParallelBody<V> {
    fn slice_archetype(&self, archetype: &mut Archetype, per_stride: usize, jobs: &mut Vec<Job>) {
        for range in stride_ranges(archetype.len(), archetype.chunk_size(), per_stride) {
            let columns = <V::Components as ComponentSet>::columns(archetype, range.chunk);
            let visitor = self.0.clone();
            jobs.push(Box::new(move || {
                for index in range.start..range.end {
                    visitor.visit(index, columns);
                }
            }));
        }
    }
}

struct TaskInner {
    name: String,
    body: Box<dyn Schedule>,
    dependencies: Mutex<Vec<Task>>,
    iterations_per_stride: AtomicUsize,
    splits: AtomicUsize,
}

/// Shared handle to a schedulable unit of work.
///
/// Clones refer to the same task, so a handle can be listed as a dependency
/// of several others.
#[derive(Clone)]
pub struct Task {
    inner: Arc<TaskInner>,
}

impl Task {
    fn from_body(name: impl Into<String>, body: Box<dyn Schedule>) -> Self {
        Self {
            inner: Arc::new(TaskInner {
                name: name.into(),
                body,
                dependencies: Mutex::new(Vec::new()),
                iterations_per_stride: AtomicUsize::new(0),
                splits: AtomicUsize::new(0),
            }),
        }
    }

    pub fn single<T: SingleTask>(name: impl Into<String>, task: T) -> Self {
        Self::from_body(name, Box::new(SingleBody(Arc::new(task))))
    }

    /// A task run for every entity holding all of `T::Components`.
    ///
    /// Panics if the component set lists a type twice.
    pub fn parallel<T: ParallelTask>(name: impl Into<String>, task: T) -> Self {
        <T::Components as ComponentSet>::assert_unique();
        Self::from_body(name, Box::new(ParallelBody(Arc::new(PerRow(task)))))
    }

    pub fn parallel_with_index<T: ParallelTaskWithIndex>(name: impl Into<String>, task: T) -> Self {
        <T::Components as ComponentSet>::assert_unique();
        Self::from_body(name, Box::new(ParallelBody(Arc::new(PerRowIndexed(task)))))
    }

    /// A task run for every index of `0..task.iterations()`. Pass an `Arc`
    /// to keep access to the task's state after submission.
    pub fn custom<T: CustomParallelTask>(name: impl Into<String>, task: T) -> Self {
        Self::from_body(name, Box::new(CustomBody(Arc::new(task))))
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn kind(&self) -> TaskKind {
        self.inner.body.kind()
    }

    /// Make `other` run to completion before this task starts.
    pub fn depends_on(&self, other: &Task) -> &Self {
        self.inner.dependencies.lock().push(other.clone());
        self
    }

    pub fn dependencies(&self) -> Vec<Task> {
        self.inner.dependencies.lock().clone()
    }

    /// Rows per slice for parallel tasks. Zero means one slice per chunk.
    pub fn set_iterations_per_stride(&self, rows: usize) -> &Self {
        self.inner.iterations_per_stride.store(rows, Ordering::Relaxed);
        self
    }

    /// Number of equal ranges for custom tasks. Zero means one per worker.
    pub fn set_splits(&self, splits: usize) -> &Self {
        self.inner.splits.store(splits, Ordering::Relaxed);
        self
    }

    /// Run this task and everything it depends on, returning when all of it
    /// has finished.
    pub fn submit(&self, archetypes: &mut ArchetypeManager, work: &WorkManager) -> Result<(), TaskError> {
        for task in self.schedule_order()? {
            task.run(archetypes, work)?;
        }
        Ok(())
    }

    /// Dependencies first, each task once.
    fn schedule_order(&self) -> Result<Vec<Task>, TaskError> {
        let mut marks = HashMap::new();
        let mut order = Vec::new();
        self.visit(&mut marks, &mut order)?;
        Ok(order)
    }

    fn visit(&self, marks: &mut HashMap<*const TaskInner, Mark>, order: &mut Vec<Task>) -> Result<(), TaskError> {
        let key = Arc::as_ptr(&self.inner);
        match marks.get(&key) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::InProgress) => {
                return Err(TaskError::DependencyCycle {
                    task: self.inner.name.clone(),
                })
            }
            None => {}
        }
        marks.insert(key, Mark::InProgress);
        for dependency in self.dependencies() {
            dependency.visit(marks, order)?;
        }
        marks.insert(key, Mark::Done);
        order.push(self.clone());
        Ok(())
    }

    fn run(&self, archetypes: &mut ArchetypeManager, work: &WorkManager) -> Result<(), TaskError> {
        let settings = SliceSettings {
            iterations_per_stride: self.inner.iterations_per_stride.load(Ordering::Relaxed),
            splits: match self.inner.splits.load(Ordering::Relaxed) {
                0 => work.worker_count().max(1),
                n => n,
            },
        };
        let jobs = self.inner.body.slices(archetypes, settings);
        tracing::trace!(task = %self.inner.name, slices = jobs.len(), "submitting task");

        let latch = CompletionLatch::new();
        let mut failure = None;
        for job in jobs {
            latch.add(1);
            let guard = latch.guard();
            let slice: Job = Box::new(move || {
                let _guard = guard;
                job();
            });
            // A rejected slice is dropped here, which completes its guard.
            if let Err(err) = work.queue().enqueue(slice) {
                failure = Some(err);
                break;
            }
        }

        // Slices borrow archetype storage, so wait for them even on failure.
        work.help_until(&latch);

        if let Some(source) = failure {
            return Err(TaskError::Work {
                task: self.inner.name.clone(),
                source,
            });
        }
        match latch.panicked() {
            0 => Ok(()),
            count => Err(TaskError::SlicePanicked {
                task: self.inner.name.clone(),
                count,
            }),
        }
    }
}

#[derive(Copy, Clone)]
enum Mark {
    InProgress,
    Done,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.inner.name)
            .field("kind", &self.kind())
            .field("dependencies", &self.inner.dependencies.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, WorkConfig};
    use crate::define_component;
    use crate::ecs::World;
    use std::sync::atomic::AtomicBool;

    #[derive(Clone, Copy, Debug, PartialEq)]
    struct Position(f32);
    define_component!(Position, 1, "Position", copy);

    #[derive(Clone, Copy, Debug, PartialEq)]
    struct Velocity(f32);
    define_component!(Velocity, 2, "Velocity", copy);

    #[derive(Clone, Copy, Debug, PartialEq)]
    struct Slot(usize);
    define_component!(Slot, 3, "Slot", copy);

    struct Integrate;

    impl ParallelTask for Integrate {
        type Components = (Position, Velocity);

        fn execute<'a>(&'a self, (position, velocity): (&'a mut Position, &'a mut Velocity)) {
            position.0 += velocity.0;
        }
    }

    struct RecordIndex;

    impl ParallelTaskWithIndex for RecordIndex {
        type Components = (Slot,);

        fn execute<'a>(&'a self, index: usize, (slot,): (&'a mut Slot,)) {
            slot.0 = index;
        }
    }

    fn setup(workers: usize) -> (World, WorkManager) {
        let mut config = EngineConfig::default();
        config.storage.chunk_size = 8;
        config.work = WorkConfig {
            worker_count: workers,
            queue_capacity: 256,
        };
        let work = WorkManager::new(&config.work).expect("spawn workers");
        (World::new(config), work)
    }

    #[test]
    fn parallel_task_visits_every_matching_entity() {
        let (mut world, work) = setup(3);
        let mut moving = Vec::new();
        for i in 0..21 {
            moving.push(world.spawn((Position(i as f32), Velocity(1.0))));
        }
        // Also matches: a superset archetype.
        let spinning = world.spawn((Velocity(2.0), Slot(0), Position(0.0)));
        let still = world.spawn((Position(5.0),));

        let task = Task::parallel("integrate", Integrate);
        task.set_iterations_per_stride(3);
        world.run(&task, &work).expect("run");

        for (i, &entity) in moving.iter().enumerate() {
            assert_eq!(world.get_component::<Position>(entity), Some(&Position(i as f32 + 1.0)));
        }
        assert_eq!(world.get_component::<Position>(spinning), Some(&Position(2.0)));
        assert_eq!(world.get_component::<Position>(still), Some(&Position(5.0)));
        assert_eq!(task.kind(), TaskKind::Parallel);
    }

    #[test]
    fn indexed_task_sees_chunk_local_rows() {
        let (mut world, work) = setup(2);
        let entities: Vec<_> = (0..12).map(|_| world.spawn((Slot(usize::MAX),))).collect();
        let task = Task::parallel_with_index("index", RecordIndex);
        world.run(&task, &work).expect("run");
        for (row, &entity) in entities.iter().enumerate() {
            assert_eq!(world.get_component::<Slot>(entity), Some(&Slot(row % 8)));
        }
    }

    struct Sum {
        total: AtomicUsize,
        len: usize,
    }

    impl CustomParallelTask for Sum {
        fn iterations(&self) -> usize {
            self.len
        }

        fn execute(&self, index: usize) {
            self.total.fetch_add(index, Ordering::Relaxed);
        }
    }

    #[test]
    fn custom_task_covers_range_with_remainder() {
        let (mut world, work) = setup(2);
        let sum = Arc::new(Sum {
            total: AtomicUsize::new(0),
            len: 101,
        });
        let task = Task::custom("sum", sum.clone());
        task.set_splits(4);
        world.run(&task, &work).expect("run");
        assert_eq!(sum.total.load(Ordering::Relaxed), (0..101).sum::<usize>());
        assert_eq!(task.kind(), TaskKind::CustomParallel);
    }

    struct Step {
        log: Arc<Mutex<Vec<&'static str>>>,
        name: &'static str,
    }

    impl SingleTask for Step {
        fn execute(&self) {
            self.log.lock().push(self.name);
        }
    }

    fn step(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> Task {
        Task::single(
            name,
            Step {
                log: log.clone(),
                name,
            },
        )
    }

    #[test]
    fn diamond_dependencies_run_once_in_order() {
        let (mut world, work) = setup(4);
        let log = Arc::new(Mutex::new(Vec::new()));
        let root = step(&log, "root");
        let left = step(&log, "left");
        let right = step(&log, "right");
        let last = step(&log, "last");
        left.depends_on(&root);
        right.depends_on(&root);
        last.depends_on(&left).depends_on(&right);

        world.run(&last, &work).expect("run");
        assert_eq!(*log.lock(), vec!["root", "left", "right", "last"]);
    }

    struct Probe {
        finished: Arc<AtomicBool>,
        observed_early: Arc<AtomicBool>,
        producer: bool,
    }

    impl CustomParallelTask for Probe {
        fn iterations(&self) -> usize {
            64
        }

        fn execute(&self, _index: usize) {
            if self.producer {
                std::thread::sleep(std::time::Duration::from_micros(200));
                self.finished.store(true, Ordering::SeqCst);
            } else if !self.finished.load(Ordering::SeqCst) {
                self.observed_early.store(true, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn dependency_slices_finish_before_dependents_start() {
        let (mut world, work) = setup(4);
        let finished = Arc::new(AtomicBool::new(false));
        let observed_early = Arc::new(AtomicBool::new(false));
        let producer = Task::custom(
            "producer",
            Probe {
                finished: finished.clone(),
                observed_early: observed_early.clone(),
                producer: true,
            },
        );
        let consumer = Task::custom(
            "consumer",
            Probe {
                finished,
                observed_early: observed_early.clone(),
                producer: false,
            },
        );
        producer.set_splits(8);
        consumer.set_splits(8).depends_on(&producer);

        world.run(&consumer, &work).expect("run");
        assert!(!observed_early.load(Ordering::SeqCst));
    }

    #[test]
    fn cycles_are_rejected() {
        let (mut world, work) = setup(1);
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = step(&log, "a");
        let b = step(&log, "b");
        a.depends_on(&b);
        b.depends_on(&a);
        let err = world.run(&a, &work).unwrap_err();
        assert!(matches!(err, TaskError::DependencyCycle { .. }));
        assert!(log.lock().is_empty());
    }

    struct Explode;

    impl CustomParallelTask for Explode {
        fn iterations(&self) -> usize {
            4
        }

        fn execute(&self, index: usize) {
            if index == 2 {
                panic!("slice {index} failed");
            }
        }
    }

    #[test]
    fn slice_panics_are_reported() {
        let (mut world, work) = setup(0);
        let task = Task::custom("explode", Explode);
        task.set_splits(4);
        let err = world.run(&task, &work).unwrap_err();
        assert!(matches!(err, TaskError::SlicePanicked { count: 1, .. }));
    }

    #[test]
    fn full_queue_is_an_error_after_draining() {
        let mut config = EngineConfig::default();
        config.work = WorkConfig {
            worker_count: 0,
            queue_capacity: 2,
        };
        let work = WorkManager::new(&config.work).expect("no workers");
        let mut world = World::new(config);
        let sum = Arc::new(Sum {
            total: AtomicUsize::new(0),
            len: 10,
        });
        let task = Task::custom("sum", sum.clone());
        task.set_splits(5);
        let err = world.run(&task, &work).unwrap_err();
        assert!(matches!(
            err,
            TaskError::Work {
                source: WorkError::QueueFull { capacity: 2 },
                ..
            }
        ));
        // The two slices that were queued still ran.
        assert_eq!(sum.total.load(Ordering::Relaxed), (0..4).sum::<usize>());
        assert!(work.queue().is_empty());
    }

    #[test]
    fn zero_splits_means_worker_count() {
        let (mut world, work) = setup(3);
        let sum = Arc::new(Sum {
            total: AtomicUsize::new(0),
            len: 30,
        });
        let task = Task::custom("sum", sum.clone());
        world.run(&task, &work).expect("run");
        assert_eq!(sum.total.load(Ordering::Relaxed), (0..30).sum::<usize>());
    }
}
