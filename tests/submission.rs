use arcwise::backend::Backend;
use arcwise::{
    DeviceError, ElementType, ElementwiseError, ElementwiseFunction, Event, Operand, Queue,
    QueueConfig, SharedBuffer,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn queue() -> Queue {
    Queue::new(QueueConfig::default().with_num_threads(4)).unwrap()
}

#[test]
fn test_many_independent_submissions() {
    let q = queue();
    let inputs: Vec<SharedBuffer> = (0..16u32)
        .map(|k| SharedBuffer::from_slice(&vec![f64::from(k) / 20.0; 100 + k as usize]))
        .collect();
    let outputs: Vec<SharedBuffer> = inputs
        .iter()
        .map(|x| SharedBuffer::zeroed(ElementType::Float64, x.len()))
        .collect();

    let events: Vec<Event> = inputs
        .iter()
        .zip(&outputs)
        .map(|(x, y)| {
            ElementwiseFunction::Atanh
                .unary_contig(&q, x.len(), Operand::new(x), Operand::new(y), &[])
                .unwrap()
        })
        .collect();
    Event::wait_all(&events).unwrap();

    for (k, y) in outputs.iter().enumerate() {
        let expected = (k as f64 / 20.0).atanh();
        assert!(y.to_vec::<f64>().unwrap().iter().all(|v| *v == expected));
    }
}

#[test]
fn test_explicit_dependency_chain() {
    let q = queue();
    let x = SharedBuffer::from_slice(&[0.5f32; 64]);
    let y = SharedBuffer::zeroed(ElementType::Float32, 64);
    let z = SharedBuffer::zeroed(ElementType::Float32, 64);

    let first = ElementwiseFunction::Atanh
        .unary_contig(&q, 64, Operand::new(&x), Operand::new(&y), &[])
        .unwrap();
    let second = ElementwiseFunction::Atan
        .unary_contig(&q, 64, Operand::new(&y), Operand::new(&z), &[first.clone()])
        .unwrap();
    second.wait().unwrap();
    assert!(first.is_complete());

    let expected = 0.5f32.atanh().atan();
    assert!(z.to_vec::<f32>().unwrap().iter().all(|v| *v == expected));
}

#[test]
fn test_buffer_hazards_order_submissions_without_explicit_depends() {
    let q = queue();
    let n = 10_000;
    let x = SharedBuffer::from_slice(&vec![0.25f64; n]);
    let y = SharedBuffer::zeroed(ElementType::Float64, n);

    // the second kernel reads `y` and overwrites `x`, so it must run after the
    // first wrote `y` and after the first finished reading `x`
    let _first = ElementwiseFunction::Atanh
        .unary_contig(&q, n, Operand::new(&x), Operand::new(&y), &[])
        .unwrap();
    let second = ElementwiseFunction::Atan
        .unary_contig(&q, n, Operand::new(&y), Operand::new(&x), &[])
        .unwrap();
    second.wait().unwrap();

    let expected = 0.25f64.atanh().atan();
    assert!(x.to_vec::<f64>().unwrap().iter().all(|v| *v == expected));
    assert!(y.to_vec::<f64>().unwrap().iter().all(|v| *v == 0.25f64.atanh()));
}

#[test]
fn test_additional_depends_are_waited_for() {
    let q = queue();
    let released = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&released);
    let gate = q.submit("gate", &[], move || {
        std::thread::sleep(Duration::from_millis(30));
        flag.store(true, Ordering::SeqCst);
        Ok(())
    });

    let x = SharedBuffer::from_slice(&[0.0f64, 1.0, 2.0, 3.0]);
    let y = SharedBuffer::zeroed(ElementType::Float64, 4);
    let event = ElementwiseFunction::Atan
        .unary_strided(
            &q,
            4,
            &[2, 2],
            Operand::new(&x).with_strides(&[2, 1]),
            Operand::new(&y).with_strides(&[2, 1]),
            &[],
            &[gate.clone()],
        )
        .unwrap();
    event.wait().unwrap();
    assert!(released.load(Ordering::SeqCst));
    assert!(gate.is_complete());
}

#[test]
fn test_submission_returns_before_prerequisites_finish() {
    let q = queue();
    let gate = q.submit("slow", &[], || {
        std::thread::sleep(Duration::from_millis(50));
        Ok(())
    });
    let x = SharedBuffer::from_slice(&[0.5f32; 8]);
    let y = SharedBuffer::zeroed(ElementType::Float32, 8);
    let event = ElementwiseFunction::Atan
        .unary_contig(&q, 8, Operand::new(&x), Operand::new(&y), &[gate.clone()])
        .unwrap();
    assert!(!event.is_complete());
    event.wait().unwrap();
    assert!(gate.is_complete());
}

#[test]
fn test_out_of_resources_is_reported_through_the_event() {
    let q = Queue::new(QueueConfig::default().with_max_work_items(4)).unwrap();
    let x = SharedBuffer::from_slice(&[0.5f64; 100]);
    let y = SharedBuffer::zeroed(ElementType::Float64, 100);

    let event = ElementwiseFunction::Atan
        .unary_contig(&q, 100, Operand::new(&x), Operand::new(&y), &[])
        .unwrap();
    let expected = DeviceError::OutOfResources {
        requested: 13,
        limit: 4,
    };
    assert_eq!(event.wait(), Err(expected.clone()));
    assert_eq!(
        y.to_vec::<f64>(),
        Err(ElementwiseError::Device(expected))
    );

    // the host overwrite replaces the failed result
    y.copy_from_slice(&[1.0f64; 100]).unwrap();
    assert_eq!(y.to_vec::<f64>().unwrap(), vec![1.0; 100]);

    // the strided path launches one work-item per element
    let event = ElementwiseFunction::Atan
        .unary_strided(
            &q,
            4,
            &[4],
            Operand::new(&x).with_strides(&[1]),
            Operand::new(&y).with_strides(&[1]),
            &[],
            &[],
        )
        .unwrap();
    assert_eq!(event.wait(), Ok(()));
}

#[test]
fn test_failed_writer_only_fails_its_readers() {
    let q = Queue::new(QueueConfig::default().with_max_work_items(4)).unwrap();
    let x = SharedBuffer::from_slice(&[0.5f64; 100]);
    let y = SharedBuffer::zeroed(ElementType::Float64, 100);
    let z = SharedBuffer::zeroed(ElementType::Float64, 8);
    let expected = DeviceError::OutOfResources {
        requested: 13,
        limit: 4,
    };

    let failed = ElementwiseFunction::Atan
        .unary_contig(&q, 100, Operand::new(&x), Operand::new(&y), &[])
        .unwrap();
    assert_eq!(failed.wait(), Err(expected.clone()));

    // consuming the failed output fails
    let reader = ElementwiseFunction::Atan
        .unary_contig(&q, 8, Operand::new(&y), Operand::new(&z), &[])
        .unwrap();
    assert_eq!(
        reader.wait(),
        Err(DeviceError::DependencyFailed(Box::new(expected)))
    );

    // replacing it does not
    let rewrite = ElementwiseFunction::Atan
        .unary_contig(&q, 8, Operand::new(&x), Operand::new(&y), &[])
        .unwrap();
    assert_eq!(rewrite.wait(), Ok(()));
    let out = y.to_vec::<f64>().unwrap();
    assert!(out[..8].iter().all(|v| *v == 0.5f64.atan()));
    assert!(out[8..].iter().all(|v| *v == 0.0));
}

#[test]
fn test_long_in_place_chain_after_a_failure() {
    let q = Queue::new(QueueConfig::default().with_max_work_items(4)).unwrap();
    let y = SharedBuffer::from_slice(&[0.5f32; 100]);
    let gate = q.submit("gate", &[], || {
        std::thread::sleep(Duration::from_millis(20));
        Ok(())
    });
    let failed = ElementwiseFunction::Atan
        .unary_contig(&q, 100, Operand::new(&y), Operand::new(&y), &[gate])
        .unwrap();

    // every link reads the previous link's output through the buffer
    let chain: Vec<Event> = (0..5_000)
        .map(|_| {
            ElementwiseFunction::Atan
                .unary_contig(&q, 8, Operand::new(&y), Operand::new(&y), &[])
                .unwrap()
        })
        .collect();

    let expected = DeviceError::OutOfResources {
        requested: 13,
        limit: 4,
    };
    assert_eq!(failed.wait(), Err(expected.clone()));
    assert_eq!(
        chain.last().unwrap().wait(),
        Err(DeviceError::DependencyFailed(Box::new(expected)))
    );
}

#[test]
fn test_failed_dependency_skips_the_kernel() {
    let q = queue();
    let failing = q.submit("failing", &[], || Err(DeviceError::Unavailable("lost".into())));
    let x = SharedBuffer::from_slice(&[0.5f32; 8]);
    let y = SharedBuffer::from_slice(&[-1.0f32; 8]);
    let event = ElementwiseFunction::Atanh
        .unary_contig(&q, 8, Operand::new(&x), Operand::new(&y), &[failing])
        .unwrap();
    assert_eq!(
        event.wait(),
        Err(DeviceError::DependencyFailed(Box::new(DeviceError::Unavailable(
            "lost".into()
        ))))
    );
    assert!(matches!(y.to_vec::<f32>(), Err(ElementwiseError::Device(_))));
}

#[test]
fn test_events_can_be_awaited() {
    let q = queue();
    let x = SharedBuffer::from_slice(&[1.0f64, -1.0]);
    let y = SharedBuffer::zeroed(ElementType::Float64, 2);
    let event = ElementwiseFunction::Atan
        .unary_contig(&q, 2, Operand::new(&x), Operand::new(&y), &[])
        .unwrap();
    pollster::block_on(async { event.await }).unwrap();
    assert_eq!(
        y.to_vec::<f64>().unwrap(),
        vec![1.0f64.atan(), (-1.0f64).atan()]
    );
}

#[test]
fn test_serial_backend_matches_parallel() {
    let serial = Queue::new(QueueConfig::default().with_backend(Backend::Serial)).unwrap();
    let parallel = queue();
    let data: Vec<f32> = (0..1000).map(|i| (i as f32 - 500.0) / 250.0).collect();
    let x = SharedBuffer::from_slice(&data);

    let mut results = Vec::new();
    for q in [&serial, &parallel] {
        let y = SharedBuffer::zeroed(ElementType::Float32, data.len());
        ElementwiseFunction::Atan
            .unary_contig(q, data.len(), Operand::new(&x), Operand::new(&y), &[])
            .unwrap()
            .wait()
            .unwrap();
        results.push(y.to_vec::<f32>().unwrap());
    }
    assert_eq!(serial.num_lanes(), 1);
    assert_eq!(results[0], results[1]);
}

#[test]
fn test_operands_are_validated_before_enqueue() {
    let q = queue();
    let x = SharedBuffer::from_slice(&[0.1f64; 6]);
    let y = SharedBuffer::zeroed(ElementType::Float64, 6);

    let err = ElementwiseFunction::Atan
        .unary_contig(&q, 7, Operand::new(&x), Operand::new(&y), &[])
        .unwrap_err();
    assert!(matches!(err, ElementwiseError::OutOfBounds { operand: 0, .. }));

    let err = ElementwiseFunction::Atan
        .unary_strided(
            &q,
            6,
            &[2, 3],
            Operand::new(&x).with_strides(&[3, 1]),
            Operand::new(&y).with_strides(&[1, 1]),
            &[],
            &[],
        )
        .unwrap_err();
    assert!(matches!(err, ElementwiseError::OverlappingOperands(_)));

    let err = ElementwiseFunction::Atan
        .unary_strided(
            &q,
            6,
            &[2, 3],
            Operand::new(&x).with_strides(&[3, 1]),
            Operand::new(&x).with_strides(&[1, 2]),
            &[],
            &[],
        )
        .unwrap_err();
    assert!(matches!(err, ElementwiseError::OverlappingOperands(_)));

    let err = ElementwiseFunction::Atan
        .unary_strided(
            &q,
            6,
            &[2, 3],
            Operand::new(&x).with_strides(&[3]),
            Operand::new(&y).with_strides(&[3, 1]),
            &[],
            &[],
        )
        .unwrap_err();
    assert!(matches!(err, ElementwiseError::ShapeMismatch(_)));

    assert_eq!(y.to_vec::<f64>().unwrap(), vec![0.0; 6]);
}
