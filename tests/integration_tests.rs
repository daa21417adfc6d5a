use storyreel::captions::CaptionSegmenter;
use storyreel::package::{PackageStage, PackageStore};
use storyreel::script::{parse_script, validate_script, ValidationOptions};
use tempfile::TempDir;
use tokio::fs;

fn raw_script(substories: usize) -> String {
    let mut text = String::new();
    for s in 0..substories {
        text.push_str(&format!("- **Substory Title**: Story {}\n", s + 1));
        text.push_str("- **Script**:\n");
        for i in 1..=5 {
            text.push_str(&format!("  - Chunk {}: Narration chunk {}.\n", i, i));
        }
        text.push_str("- **Image Prompts**:\n");
        for i in 1..=5 {
            text.push_str(&format!("  - Chunk {} Prompt: Scene {}.\n", i, i));
        }
        text.push_str("- **General Prompt**: muted watercolor style\n\n");
    }
    text
}

#[tokio::test]
async fn test_raw_text_to_ready_package_flow() {
    let temp_dir = TempDir::new().unwrap();
    let store = PackageStore::new(temp_dir.path());
    store.ensure_layout().await.unwrap();

    // Raw model output lands in scripts/.
    let raw_path = store.scripts_dir().join("Chapter_One.txt");
    fs::write(&raw_path, raw_script(2)).await.unwrap();

    // Parse, validate, persist, consume.
    let text = fs::read_to_string(&raw_path).await.unwrap();
    let script = parse_script(&text);
    validate_script(&script, &ValidationOptions::default()).unwrap();

    store
        .persist_processed_script("Chapter_One", &script)
        .await
        .unwrap();
    store.consume_raw_script(&raw_path).await.unwrap();

    assert!(!raw_path.exists());
    assert!(store.used_scripts_dir().join("Chapter_One.txt").exists());

    // One package per substory.
    let loaded = store.load_processed_scripts().await.unwrap();
    assert_eq!(loaded.len(), 1);
    let (stem, script) = &loaded[0];
    assert_eq!(script.substories.len(), 2);

    for substory in &script.substories {
        let package = store.create_package(substory, stem).await.unwrap();
        assert_eq!(package.stage(), PackageStage::Created);
        assert!(!package.is_ready_for_video());
    }

    assert_eq!(store.list_packages().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_readiness_drives_the_sweep_contract() {
    let temp_dir = TempDir::new().unwrap();
    let store = PackageStore::new(temp_dir.path());
    store.ensure_layout().await.unwrap();

    let script = parse_script(&raw_script(1));
    let substory = &script.substories[0];
    let package = store.create_package(substory, "Chapter_One").await.unwrap();

    // Fill in the assets a real run would generate.
    fs::create_dir_all(package.images_dir()).await.unwrap();
    fs::create_dir_all(package.audio_dir()).await.unwrap();
    for i in 0..substory.lines.len() {
        fs::write(package.images_dir().join(format!("image_{}.png", i)), b"img")
            .await
            .unwrap();
        fs::write(package.audio_dir().join(format!("audio_{}.mp3", i)), b"aud")
            .await
            .unwrap();
    }

    assert!(package.is_ready_for_video());
    assert_eq!(package.stage(), PackageStage::AudioDone);

    // Claim, then promote the way a sweep does after a successful render.
    let claimed = store.claim(package).await.unwrap();
    assert!(store.list_packages().await.unwrap().is_empty());

    let ready_path = store.promote(claimed).await.unwrap();
    assert!(ready_path.join("script.json").exists());
    assert!(ready_path.join("images").join("image_0.png").exists());

    // A second sweep has nothing left to process.
    assert!(store.list_packages().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_caption_track_matches_narration_timing() {
    let script = parse_script(&raw_script(1));
    let substory = &script.substories[0];

    // One fake probed duration per narration clip.
    let durations: Vec<f64> = (0..substory.lines.len())
        .map(|i| 5.0 + i as f64)
        .collect();
    let total: f64 = durations.iter().sum();

    let segmenter = CaptionSegmenter::default();
    let cues = segmenter.segment(&substory.lines, &durations);

    assert_eq!(cues.first().unwrap().start, 0.0);
    assert_eq!(cues.last().unwrap().end, total);
    for pair in cues.windows(2) {
        assert_eq!(pair[0].end, pair[1].start);
    }
    assert!(cues.iter().all(|c| !c.text.is_empty()));
}

#[test]
fn test_rejected_scripts_never_reach_packaging() {
    // Four narration chunks: below the structural minimum.
    let mut text = String::from("- **Substory Title**: Too Short\n- **Script**:\n");
    for i in 1..=4 {
        text.push_str(&format!("  - Chunk {}: Narration {}.\n", i, i));
    }
    text.push_str("- **Image Prompts**:\n");
    for i in 1..=5 {
        text.push_str(&format!("  - Chunk {} Prompt: Scene {}.\n", i, i));
    }
    text.push_str("- **General Prompt**: style\n");

    let script = parse_script(&text);
    assert!(validate_script(&script, &ValidationOptions::default()).is_err());
}
